use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::http::get_http_client;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTemplateRequest<'a> {
    image_base64: String,
    headline: &'a str,
    date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteTemplateResponse {
    success: bool,
    template: Option<String>,
}

/// Proxies template generation to a remote instance of the template API.
pub async fn generate_remote(
    base_url: &str,
    user_image: &[u8],
    headline: &str,
    date: &str,
) -> Result<Vec<u8>> {
    let payload = RemoteTemplateRequest {
        image_base64: general_purpose::STANDARD.encode(user_image),
        headline,
        date,
        template_base64: None,
    };

    let response = get_http_client()
        .post(base_url)
        .json(&payload)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(anyhow!("template API error: {}", response.status()));
    }

    let body = response.json::<RemoteTemplateResponse>().await?;
    let template = match body.template {
        Some(template) if body.success => template,
        _ => return Err(anyhow!("invalid response from template API")),
    };

    let bytes = general_purpose::STANDARD
        .decode(template.as_bytes())
        .map_err(|err| anyhow!("template API returned invalid base64: {err}"))?;
    info!("Template created via remote API ({} bytes)", bytes.len());
    Ok(bytes)
}

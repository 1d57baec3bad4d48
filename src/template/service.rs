use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::CONFIG;

use super::compose::{compose, compose_from_urls};
use super::font::FontSet;

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

struct ServiceState {
    background: Option<Vec<u8>>,
    fonts: FontSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateRequest {
    image_base64: Option<String>,
    headline: Option<String>,
    date: Option<String>,
    template_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateFromUrlRequest {
    image_url: Option<String>,
    headline: Option<String>,
    date: Option<String>,
    template_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateResponse {
    success: bool,
    template: String,
    content_type: &'static str,
    message: &'static str,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn default_date(date: Option<String>) -> String {
    date.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Local::now().format("%m/%d/%Y").to_string())
}

/// Serves the template-generation HTTP API alongside the bot.
pub async fn run(port: u16) -> Result<()> {
    let fonts = FontSet::load(&CONFIG.font_path)?;
    let background = match std::fs::read(&CONFIG.template_path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(
                "Background template {} not found ({err}); URL-based templates only",
                CONFIG.template_path
            );
            None
        }
    };

    let state = Arc::new(ServiceState { background, fonts });
    let app = Router::new()
        .route("/", get(health))
        .route("/api/template", post(create_template))
        .route("/api/template-from-url", post(create_template_from_url))
        .route("/api/template/download", post(download_template))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Template API listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Response {
    Json(json!({
        "status": "ok",
        "service": "LK NEWS Image Template Generator",
        "endpoints": ["/api/template", "/api/template-from-url", "/api/template/download"],
    }))
    .into_response()
}

async fn render_from_request(
    state: &ServiceState,
    request: TemplateRequest,
) -> Result<Vec<u8>, Response> {
    let (Some(image_base64), Some(headline)) = (request.image_base64, request.headline) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Missing required fields: imageBase64, headline",
        ));
    };

    let background = match request.template_base64 {
        Some(template) => general_purpose::STANDARD
            .decode(template.as_bytes())
            .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid templateBase64"))?,
        None => state.background.clone().ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "Template not available. Provide templateBase64 or ensure the template image exists.",
            )
        })?,
    };

    let user_image = general_purpose::STANDARD
        .decode(image_base64.as_bytes())
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid imageBase64"))?;

    let date = default_date(request.date);
    let fonts = state.fonts.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        compose(&user_image, &headline, &date, &background, &fonts)
    })
    .await
    .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;

    rendered.map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))
}

async fn create_template(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<TemplateRequest>,
) -> Response {
    match render_from_request(&state, request).await {
        Ok(png) => Json(TemplateResponse {
            success: true,
            template: general_purpose::STANDARD.encode(&png),
            content_type: "image/png",
            message: "Template created successfully",
        })
        .into_response(),
        Err(response) => response,
    }
}

async fn create_template_from_url(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<TemplateFromUrlRequest>,
) -> Response {
    let (Some(image_url), Some(headline), Some(template_url)) =
        (request.image_url, request.headline, request.template_url)
    else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Missing required fields: imageUrl, headline, templateUrl",
        );
    };

    let date = default_date(request.date);
    match compose_from_urls(&image_url, &headline, &date, &template_url, &state.fonts).await {
        Ok(png) => Json(TemplateResponse {
            success: true,
            template: general_purpose::STANDARD.encode(&png),
            content_type: "image/png",
            message: "Template created successfully",
        })
        .into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

async fn download_template(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<TemplateRequest>,
) -> Response {
    match render_from_request(&state, request).await {
        Ok(png) => {
            let filename = format!("news-template-{}.png", Local::now().timestamp_millis());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                png,
            )
                .into_response()
        }
        Err(response) => response,
    }
}

use std::env;

use anyhow::Result;
use once_cell::sync::Lazy;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: Option<i64>,
    pub log_level: String,
    pub database_url: String,
    pub webhook_url: Option<Url>,
    pub webhook_port: u16,
    pub template_api_url: String,
    pub template_path: String,
    pub template_service_port: Option<u16>,
    pub tiktok_api_url: String,
    pub font_path: String,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_opt_u16(name: &str) -> Option<u16> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
}

fn env_opt_i64(name: &str) -> Option<i64> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
}

fn env_opt_url(name: &str) -> Option<Url> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| Url::parse(value.trim()).ok())
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            bot_token: env_string("BOT_TOKEN", ""),
            owner_id: env_opt_i64("OWNER_ID"),
            log_level: env_string("LOG_LEVEL", "info"),
            database_url: env_string("DATABASE_URL", "sqlite://bot.db?mode=rwc"),
            webhook_url: env_opt_url("WEBHOOK_URL"),
            webhook_port: env_u16("WEBHOOK_PORT", 8443),
            template_api_url: env_string("TEMPLATE_API_URL", ""),
            template_path: env_string("TEMPLATE_PATH", "template.png"),
            template_service_port: env_opt_u16("TEMPLATE_SERVICE_PORT"),
            tiktok_api_url: env_string("TIKTOK_API_URL", "https://www.tikwm.com/api/"),
            font_path: env_string(
                "FONT_PATH",
                "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            ),
        })
    }

    pub fn is_owner(&self, chat_id: i64) -> bool {
        self.owner_id == Some(chat_id)
    }
}

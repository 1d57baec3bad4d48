pub mod client;
pub mod compose;
pub mod font;
pub mod layout;
pub mod service;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid image: {0}")]
    Decode(String),
    #[error("font: {0}")]
    Font(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("fetch: {0}")]
    Fetch(String),
}

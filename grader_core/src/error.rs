use std::string;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("entity `{0}` not found")]
    NotFound(String),
    #[error("failed in IO: {0}")]
    IO(#[from] std::io::Error),
    #[error("argument provided is error: {0}")]
    Argument(String),
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to init box {box_id}: {msg}")]
    SandboxInit { box_id: u64, msg: String },
    #[error("sandbox error: {0}")]
    Sandbox(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("bytes is not in UTF8")]
    FromUtf8(#[from] string::FromUtf8Error),
    #[error("callback error: {0}")]
    Callback(#[from] reqwest::Error),
    #[error("environment error: {0}")]
    Environment(String),
}

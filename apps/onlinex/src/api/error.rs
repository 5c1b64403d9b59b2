use reqwest::StatusCode;
use thiserror::Error;

use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api base url is not configured; set ONLINEX_API_URL")]
    NotConfigured,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session expired; log in again")]
    Unauthorized,
    #[error("{message} (status {status})")]
    Rejected { status: StatusCode, message: String },
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Session(#[from] SessionError),
}

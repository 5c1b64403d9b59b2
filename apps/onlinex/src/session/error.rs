use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Toml(String),
    #[error("session token must not be empty")]
    EmptyToken,
    #[error("no active session; run `onlinex login` or `onlinex guest <name>`")]
    NotLoggedIn,
}

impl From<toml::de::Error> for SessionError {
    fn from(value: toml::de::Error) -> Self {
        SessionError::Toml(value.to_string())
    }
}

impl From<toml::ser::Error> for SessionError {
    fn from(value: toml::ser::Error) -> Self {
        SessionError::Toml(value.to_string())
    }
}

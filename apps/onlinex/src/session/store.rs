use crate::session::error::SessionError;
use crate::session::{DEFAULT_TOKEN_TYPE, SessionCredential};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredSession {
    pub fn new(credential: &SessionCredential, username: Option<String>, temporary: bool) -> Self {
        Self {
            token: credential.token().to_string(),
            token_type: Some(credential.token_type().to_string()),
            username,
            temporary,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn credential(&self) -> Result<SessionCredential, SessionError> {
        let token_type = self.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE);
        SessionCredential::new(self.token.clone(), token_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionFile {
    #[serde(default)]
    current: Option<StoredSession>,
}

/// TOML file holding the session of whoever last logged in on this machine.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf, SessionError> {
        let base = BaseDirs::new()
            .ok_or_else(|| SessionError::Config("unable to determine home directory".into()))?;
        Ok(base.home_dir().join(".onlinex").join("session"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: SessionFile = toml::from_str(&raw)?;
        Ok(file.current.filter(|session| !session.token.trim().is_empty()))
    }

    /// Credential of the stored session, `None` when nobody is logged in.
    pub fn credential(&self) -> Result<Option<SessionCredential>, SessionError> {
        self.load()?
            .map(|session| session.credential())
            .transpose()
    }

    pub fn require_credential(&self) -> Result<SessionCredential, SessionError> {
        self.credential()?.ok_or(SessionError::NotLoggedIn)
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = SessionFile {
            current: Some(session.clone()),
        };
        let serialized = toml::to_string_pretty(&file)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut handle = options.open(&self.path)?;
        handle.write_all(serialized.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = handle.metadata()?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }
        tracing::debug!(
            target: "onlinex::session",
            path = %self.path.display(),
            temporary = session.temporary,
            "session saved"
        );
        Ok(())
    }

    /// Forget the stored session. Missing files are fine.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(
                    target: "onlinex::session",
                    path = %self.path.display(),
                    "session cleared"
                );
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

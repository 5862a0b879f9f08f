//! Exportable connection codes.
//!
//! A ticket is a [`SessionDescriptor`] wrapped for copy/paste exchange
//! according to the configured [`EncryptionLevel`]. Key stretching is
//! CPU-heavy, so sealing and opening run on tokio's blocking pool.

use super::crypto;
use super::descriptor::SessionDescriptor;
use crate::core::config::APP_SECRET;
use crate::core::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::debug;

// ── Encryption level ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionLevel {
    /// Sealed with the application-wide secret.
    #[default]
    Standard,
    /// Sealed with a passphrase both users agreed on.
    Personal,
    /// Descriptor exchanged in clear.
    Open,
}

impl FromStr for EncryptionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "personal" => Ok(Self::Personal),
            "open" => Ok(Self::Open),
            other => anyhow::bail!("unknown encryption level '{other}' (standard|personal|open)"),
        }
    }
}

impl Display for EncryptionLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Personal => f.write_str("personal"),
            Self::Open => f.write_str("open"),
        }
    }
}

// ── Crypto config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CryptoConfig {
    pub level: EncryptionLevel,
    pub passphrase: String,
}

impl CryptoConfig {
    pub fn new(level: EncryptionLevel, passphrase: impl Into<String>) -> Self {
        Self {
            level,
            passphrase: passphrase.into(),
        }
    }

    /// The password codes are sealed with, or `None` for the open level.
    pub fn secret(&self) -> Result<Option<String>, SessionError> {
        match self.level {
            EncryptionLevel::Standard => Ok(Some(APP_SECRET.to_string())),
            EncryptionLevel::Personal if self.passphrase.is_empty() => {
                Err(SessionError::MissingPassphrase)
            }
            EncryptionLevel::Personal => Ok(Some(self.passphrase.clone())),
            EncryptionLevel::Open => Ok(None),
        }
    }
}

// ── Ticket ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub descriptor: SessionDescriptor,
}

impl Ticket {
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self { descriptor }
    }

    /// Render the descriptor as a shareable code.
    pub async fn export(&self, config: &CryptoConfig) -> Result<String, SessionError> {
        let json = self.descriptor.to_json()?;
        match config.secret()? {
            None => Ok(json),
            Some(secret) => blocking(move || crypto::encrypt(&json, &secret)).await,
        }
    }

    /// Open a code pasted by the peer.
    ///
    /// Decryption failures surface as [`SessionError::AuthenticationFailure`],
    /// structural problems as [`SessionError::InvalidCode`].
    pub async fn parse(code: &str, config: &CryptoConfig) -> Result<Self, SessionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SessionError::InvalidCode("empty code".into()));
        }

        let json = match config.secret()? {
            None => code.to_string(),
            Some(secret) => {
                let code = code.to_string();
                blocking(move || crypto::decrypt(&code, &secret)).await?
            }
        };

        let descriptor = SessionDescriptor::parse(&json)?;
        debug!(event = "ticket_parsed", role = %descriptor.role, level = %config.level);
        Ok(Self { descriptor })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SessionError>
where
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Task(e.to_string()))?
}

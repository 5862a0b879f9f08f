use crate::core::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Which side of the negotiation produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorRole {
    Offer,
    Answer,
}

impl Display for DescriptorRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offer => f.write_str("offer"),
            Self::Answer => f.write_str("answer"),
        }
    }
}

/// One side's connection parameters, in WebRTC session-description JSON
/// form: `{"type":"offer","sdp":"v=0..."}`.
///
/// Produced once per negotiation attempt and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(rename = "type")]
    pub role: DescriptorRole,
    pub sdp: String,
}

impl SessionDescriptor {
    pub fn new(role: DescriptorRole, sdp: impl Into<String>) -> Self {
        Self {
            role,
            sdp: sdp.into(),
        }
    }

    /// Parse descriptor JSON, rejecting anything that is not a usable
    /// offer or answer.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let descriptor: Self = serde_json::from_str(text.trim())
            .map_err(|e| SessionError::InvalidCode(format!("malformed descriptor: {e}")))?;

        if !descriptor.sdp.starts_with("v=") {
            return Err(SessionError::InvalidCode(
                "descriptor does not contain a session description".into(),
            ));
        }
        Ok(descriptor)
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Task(e.to_string()))
    }
}

//! Wire codec: command/response envelopes carried as a single JSON text
//! frame per datagram, with binary block payloads base64-encoded inline.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to decode block payload: {0}")]
    Block(#[from] base64::DecodeError),
}

/// A request frame: command name, a free-form parameters object, and an
/// optional sender name (used for logging, not authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Request {
    pub fn new(command: impl Into<String>, parameters: serde_json::Value, sender: Option<&str>) -> Self {
        Request {
            command: command.into(),
            parameters,
            sender: sender.map(str::to_string),
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a received frame. Matches the source's `parse_message`: malformed
    /// JSON yields `None` rather than an error, since the sender will simply
    /// time out waiting for a reply.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failure,
}

/// A response frame: status plus optional human message and data payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn success(data: Option<serde_json::Value>) -> Self {
        Response {
            status: Status::Success,
            message: None,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Response {
            status: Status::Failure,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Encode binary block data to base64 for embedding in a JSON frame.
pub fn encode_block(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode a base64 block payload back to bytes.
pub fn decode_block(encoded: &str) -> Result<Vec<u8>, WireError> {
    Ok(BASE64.decode(encoded)?)
}

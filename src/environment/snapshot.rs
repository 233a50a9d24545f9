use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;

const DEFAULT_MEDIA_TYPE: &str = "image/png";

/// A point-in-time capture of the page, held as base64 without any
/// `data:` URL prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub media_type: String,
    pub data: String,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
            captured_at: chrono::Utc::now(),
        }
    }

    /// Accepts `data:image/<fmt>;base64,<payload>` or a bare base64 payload
    /// (assumed PNG).
    pub fn from_data_url(url: &str) -> Result<Self, CaptureError> {
        let url = url.trim();
        let (media_type, payload) = match url.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| CaptureError::Failed("data URL has no payload".into()))?;
                let media_type = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| CaptureError::Failed(format!("data URL is not base64: {header}")))?;
                let media_type = if media_type.is_empty() { DEFAULT_MEDIA_TYPE } else { media_type };
                (media_type, payload)
            }
            None => (DEFAULT_MEDIA_TYPE, url),
        };

        if payload.is_empty() {
            return Err(CaptureError::Failed("snapshot payload is empty".into()));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| CaptureError::Failed(format!("invalid base64 payload: {e}")))?;

        Ok(Self {
            media_type: media_type.to_string(),
            data: payload.to_string(),
            captured_at: chrono::Utc::now(),
        })
    }

    pub fn bytes(&self) -> Result<Vec<u8>, CaptureError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| CaptureError::Failed(format!("invalid base64 payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_stripped() {
        let snap = Snapshot::from_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(snap.media_type, "image/jpeg");
        assert_eq!(snap.data, "aGVsbG8=");
        assert_eq!(snap.bytes().unwrap(), b"hello");
    }

    #[test]
    fn bare_payload_defaults_to_png() {
        let snap = Snapshot::from_data_url("aGVsbG8=").unwrap();
        assert_eq!(snap.media_type, "image/png");
    }

    #[test]
    fn malformed_data_urls_are_capture_errors() {
        assert!(Snapshot::from_data_url("data:image/png;base64,").is_err());
        assert!(Snapshot::from_data_url("data:image/png,abc").is_err());
        assert!(Snapshot::from_data_url("data:image/png;base64,%%%").is_err());
    }

    #[test]
    fn from_bytes_round_trips() {
        let snap = Snapshot::from_bytes("image/png", &[1, 2, 3]);
        assert_eq!(snap.bytes().unwrap(), vec![1, 2, 3]);
    }
}

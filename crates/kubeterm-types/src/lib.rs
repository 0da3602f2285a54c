//! Shared types for kubeterm
//!
//! This crate contains the data structures exchanged between the cluster
//! session manager, the exec bridge, and the front end.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Cluster Types
// ============================================================================

/// How the process authenticated against the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterMode {
    /// Service-account credentials mounted into the pod
    InCluster,
    /// A kubeconfig file on the local machine
    Local,
}

impl ClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InCluster => "in-cluster",
            Self::Local => "local",
        }
    }
}

/// Kubernetes context information
#[derive(Clone, Debug)]
pub struct ContextInfo {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
    pub is_current: bool,
}

impl ContextInfo {
    pub fn new(
        name: String,
        cluster: String,
        user: String,
        namespace: Option<String>,
        is_current: bool,
    ) -> Self {
        Self {
            name,
            cluster,
            user,
            namespace,
            is_current,
        }
    }
}

// ============================================================================
// Terminal Types
// ============================================================================

/// Terminal dimensions in character cells
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl TerminalSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for TerminalSize {
    /// 120 columns by 30 rows, applied before the client reports its own size
    fn default() -> Self {
        Self { rows: 30, cols: 120 }
    }
}

/// Why an inbound frame could not be used
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed terminal frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid terminal size {rows}x{cols}")]
    InvalidSize { rows: u16, cols: u16 },
}

/// A frame on the client-side socket, one JSON object per frame
///
/// ```json
/// {"type": "input", "data": "ls\n"}
/// {"type": "resize", "rows": 40, "cols": 160}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TerminalMessage {
    Input { data: String },
    Output { data: String },
    Resize { rows: u16, cols: u16 },
}

impl TerminalMessage {
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    /// Parse one client frame. Unknown types, missing fields and zero-sized
    /// resizes are all rejected.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        let message: Self = serde_json::from_str(frame)?;
        if let Self::Resize { rows, cols } = message {
            if rows == 0 || cols == 0 {
                return Err(FrameError::InvalidSize { rows, cols });
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The resize carried by this frame, if any
    pub fn size(&self) -> Option<TerminalSize> {
        match self {
            Self::Resize { rows, cols } => Some(TerminalSize::new(*rows, *cols)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_input() {
        let msg = TerminalMessage::decode(r#"{"type":"input","data":"echo hi\n"}"#).unwrap();
        assert_eq!(
            msg,
            TerminalMessage::Input {
                data: "echo hi\n".to_string()
            }
        );
    }

    #[test]
    fn test_decode_resize() {
        let msg = TerminalMessage::decode(r#"{"type":"resize","rows":40,"cols":160}"#).unwrap();
        assert_eq!(msg.size(), Some(TerminalSize::new(40, 160)));
    }

    #[test]
    fn test_decode_rejects_unknown_and_incomplete_frames() {
        assert!(TerminalMessage::decode(r#"{"type":"bogus"}"#).is_err());
        assert!(TerminalMessage::decode(r#"{"type":"input"}"#).is_err());
        assert!(TerminalMessage::decode(r#"{"type":"resize","rows":40}"#).is_err());
        assert!(TerminalMessage::decode(r#"{"type":"resize","rows":70000,"cols":1}"#).is_err());
        assert!(TerminalMessage::decode("not json").is_err());
    }

    #[test]
    fn test_decode_rejects_zero_size() {
        let err = TerminalMessage::decode(r#"{"type":"resize","rows":0,"cols":80}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidSize { rows: 0, cols: 80 }));
    }

    #[test]
    fn test_encode_output() {
        let frame = TerminalMessage::output("hi\r\n").encode().unwrap();
        assert_eq!(frame, r#"{"type":"output","data":"hi\r\n"}"#);
    }

    #[test]
    fn test_default_size() {
        assert_eq!(TerminalSize::default(), TerminalSize::new(30, 120));
    }
}

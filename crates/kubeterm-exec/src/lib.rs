//! Interactive exec bridge for kubeterm
//!
//! This crate relays a live shell session between a client-side frame socket
//! (typically a browser WebSocket) and a process running inside a pod.

mod bridge;
mod error;
mod size_queue;
mod target;
mod transport;
mod utf8;

pub use bridge::{ExecSessionBridge, SessionReport};
pub use error::ExecError;
pub use size_queue::{ResizeSender, TerminalSizeQueue, resize_channel};
pub use target::ExecTarget;
pub use transport::{ExecIo, KubeExec, RemoteExec, default_shell_command};
pub use utf8::Utf8Decoder;

// Re-export types used in our public API
pub use kubeterm_types::{FrameError, TerminalMessage, TerminalSize};

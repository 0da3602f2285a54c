//! Kubernetes cluster session for kubeterm
//!
//! This crate owns the active cluster client and namespace, and lets the
//! rest of the system switch contexts without ever observing a half-applied
//! switch.

mod error;
mod kubeconfig;
mod session;

pub use error::SessionError;
pub use kubeconfig::{
    DEFAULT_NAMESPACE, SERVICE_ACCOUNT_NAMESPACE, namespace_from_file, namespace_from_file_or_default,
};
pub use session::{ClusterBinding, ClusterSessionManager};

// Re-export types that are used in our public API
pub use kubeterm_types::{ClusterMode, ContextInfo};

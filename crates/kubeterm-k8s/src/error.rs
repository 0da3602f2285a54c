use kube::config::KubeconfigError;
use thiserror::Error;

/// Errors returned by the cluster session manager
#[derive(Debug, Error)]
pub enum SessionError {
    /// Neither in-cluster credentials nor a kubeconfig could be loaded
    #[error("no usable cluster credentials (in-cluster: {in_cluster}; kubeconfig: {local})")]
    Authentication { in_cluster: String, local: String },

    #[error("context {0} not found")]
    ContextNotFound(String),

    #[error("cannot switch context in in-cluster mode")]
    UnsupportedOperation,

    #[error("failed to load config for context {context}: {source}")]
    Kubeconfig {
        context: String,
        #[source]
        source: KubeconfigError,
    },

    #[error("failed to create client for context {context}: {source}")]
    ClientBuild {
        context: String,
        #[source]
        source: kube::Error,
    },
}

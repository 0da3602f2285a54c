use thiserror::Error;

/// Errors that can occur while opening or running an exec session
#[derive(Debug, Error)]
pub enum ExecError {
    /// A required part of the exec target was empty
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote command failed or its stream broke mid-session
    #[error("{0}")]
    Stream(String),

    #[error("exec transport did not provide {0}")]
    MissingStream(&'static str),

    #[error("exec session cancelled")]
    Cancelled,
}

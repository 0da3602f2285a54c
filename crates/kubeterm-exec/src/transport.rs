//! Remote exec transports
//!
//! The bridge talks to the remote side through [`RemoteExec`]: one call that
//! opens an interactive, TTY-enabled exec against a container and streams
//! until the remote process ends. [`KubeExec`] implements it on top of the
//! pod `exec` subresource.

use async_trait::async_trait;
use futures::SinkExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{AttachParams, TerminalSize as KubeTerminalSize};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExecError;
use crate::size_queue::TerminalSizeQueue;
use crate::target::ExecTarget;
use kubeterm_types::TerminalSize;

/// Shell used when no command is configured: bash if present, else sh,
/// with an interactive terminal type.
pub fn default_shell_command() -> Vec<String> {
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        "TERM=xterm-256color; export TERM; [ -x /bin/bash ] && exec /bin/bash || exec /bin/sh"
            .to_string(),
    ]
}

/// The local ends of an exec session's streams
pub struct ExecIo {
    /// Bytes to feed to the remote process. EOF closes its stdin.
    pub stdin: DuplexStream,
    /// Receives the remote's combined stdout and stderr
    pub stdout: DuplexStream,
    /// Terminal sizes to apply, pulled until it returns `None`
    pub sizes: TerminalSizeQueue,
}

/// Something that can run an interactive exec session.
///
/// `stream` blocks until the remote process exits, the transport fails, or
/// `cancel` fires. The streams in `io` are dropped (closed) when it returns.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn stream(
        &self,
        target: &ExecTarget,
        io: ExecIo,
        cancel: CancellationToken,
    ) -> Result<(), ExecError>;
}

/// Exec through the Kubernetes API server
#[derive(Clone)]
pub struct KubeExec {
    client: kube::Client,
    command: Vec<String>,
}

impl KubeExec {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            command: default_shell_command(),
        }
    }

    /// Override the command run in the container. An empty command keeps the
    /// default shell.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.command = command;
        }
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

fn kube_size(size: TerminalSize) -> KubeTerminalSize {
    KubeTerminalSize {
        width: size.cols,
        height: size.rows,
    }
}

#[async_trait]
impl RemoteExec for KubeExec {
    async fn stream(
        &self,
        target: &ExecTarget,
        io: ExecIo,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        let ExecIo {
            mut stdin,
            mut stdout,
            mut sizes,
        } = io;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), target.namespace());
        // With a TTY the API server merges stderr into stdout
        let params = AttachParams::interactive_tty().container(target.container());

        let mut attached = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
            attached = pods.exec(target.pod(), &self.command, &params) => attached?,
        };

        let mut remote_stdin = attached.stdin().ok_or(ExecError::MissingStream("stdin"))?;
        let mut remote_stdout = attached
            .stdout()
            .ok_or(ExecError::MissingStream("stdout"))?;
        let resize = attached.terminal_size();
        let status = attached.take_status();

        let forward_input = async move {
            if let Err(e) = tokio::io::copy(&mut stdin, &mut remote_stdin).await {
                debug!(error = %e, "Exec stdin forwarding stopped");
            }
            let _ = remote_stdin.shutdown().await;
        };
        tokio::pin!(forward_input);

        let forward_sizes = async move {
            let Some(mut resize) = resize else {
                return;
            };
            while let Some(size) = sizes.next().await {
                if resize.send(kube_size(size)).await.is_err() {
                    break;
                }
            }
        };
        tokio::pin!(forward_sizes);

        let forward_output = tokio::io::copy(&mut remote_stdout, &mut stdout);
        tokio::pin!(forward_output);

        let mut input_done = false;
        let mut sizes_done = false;

        // The session lasts as long as the remote output stream
        let relayed: Result<(), ExecError> = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Err(ExecError::Cancelled),
                copied = &mut forward_output => break copied.map(|_| ()).map_err(ExecError::from),
                _ = &mut forward_input, if !input_done => input_done = true,
                _ = &mut forward_sizes, if !sizes_done => sizes_done = true,
            }
        };

        if let Err(e) = relayed {
            attached.abort();
            return Err(e);
        }

        if cancel.is_cancelled() {
            attached.abort();
            return Err(ExecError::Cancelled);
        }
        // Output has ended, so the connection task is already finishing
        attached
            .join()
            .await
            .map_err(|e| ExecError::Stream(e.to_string()))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(ExecError::Stream(status.message.unwrap_or_else(|| {
                        "command terminated with non-zero exit code".to_string()
                    })));
                }
            }
        }

        Ok(())
    }
}

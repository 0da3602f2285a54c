//! Relay between a client frame socket and a remote exec transport
//!
//! Each session runs two spawned pumps:
//! - inbound: client frames -> remote stdin / resize queue
//! - outbound: remote output -> `output` frames to the client
//!
//! The session ends when the transport's `stream` call returns. The bridge
//! then stops the inbound pump, lets the outbound pump drain, sends one final
//! `output` frame describing how the session ended, and joins both pumps
//! before handing the client halves back to the caller.

use std::fmt::Display;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::ExecError;
use crate::size_queue::{ResizeSender, resize_channel};
use crate::target::ExecTarget;
use crate::transport::{ExecIo, RemoteExec};
use crate::utf8::Utf8Decoder;
use kubeterm_types::{TerminalMessage, TerminalSize};

/// Buffer size of the in-memory pipes feeding the transport
const PIPE_CAPACITY: usize = 64 * 1024;

/// Default read size for remote output
const DEFAULT_CHUNK_SIZE: usize = 4096;

/// What a finished session hands back to its caller
pub struct SessionReport<Si, St> {
    /// How the remote stream ended
    pub outcome: Result<(), ExecError>,
    /// Client write half; `None` only if the outbound pump panicked
    pub sink: Option<Si>,
    /// Client read half; `None` only if the inbound pump panicked
    pub stream: Option<St>,
}

/// Relays one interactive shell session for one container.
///
/// Sessions share nothing with each other and are not registered anywhere;
/// a session ends only through its own streams or the cancel token passed
/// to [`ExecSessionBridge::run`].
pub struct ExecSessionBridge<R> {
    remote: R,
    target: ExecTarget,
    initial_size: TerminalSize,
    chunk_size: usize,
}

impl<R: RemoteExec> ExecSessionBridge<R> {
    pub fn new(remote: R, target: ExecTarget) -> Self {
        Self {
            remote,
            target,
            initial_size: TerminalSize::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Size applied before the client sends its first resize
    pub fn with_initial_size(mut self, size: TerminalSize) -> Self {
        self.initial_size = size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn target(&self) -> &ExecTarget {
        &self.target
    }

    /// Run the session to completion.
    ///
    /// `sink` and `stream` are the two halves of the client socket, carrying
    /// one JSON [`TerminalMessage`] per frame. They are returned in the
    /// report and never closed here; closing the connection is up to the
    /// caller. `cancel` aborts the remote transport.
    pub async fn run<Si, St, E>(
        self,
        sink: Si,
        stream: St,
        cancel: CancellationToken,
    ) -> SessionReport<Si, St>
    where
        Si: Sink<String> + Unpin + Send + 'static,
        Si::Error: Display,
        St: Stream<Item = Result<String, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let target = self.target;
        info!(
            pod = target.pod(),
            namespace = target.namespace(),
            container = target.container(),
            "Exec session started"
        );

        let (stdin_writer, stdin_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_writer, stdout_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (resize, sizes) = resize_channel(Some(self.initial_size));
        let terminated = CancellationToken::new();

        let inbound = tokio::spawn(inbound_pump(
            stream,
            stdin_writer,
            resize,
            terminated.clone(),
        ));
        let outbound = tokio::spawn(outbound_pump(sink, stdout_reader, self.chunk_size));

        let io = ExecIo {
            stdin: stdin_reader,
            stdout: stdout_writer,
            sizes,
        };
        // Dropping `io` inside `stream` closes both pipes on the remote side
        let outcome = self.remote.stream(&target, io, cancel).await;
        terminated.cancel();

        let farewell = match &outcome {
            Ok(()) => "\r\n\r\nSession ended.".to_string(),
            Err(e) => format!("\r\n\r\nSession ended: {}", e),
        };

        let mut sink = match outbound.await {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(error = %e, "Outbound pump failed");
                None
            }
        };
        if let Some(sink) = sink.as_mut() {
            send_output(sink, farewell).await;
        }

        let stream = match inbound.await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Inbound pump failed");
                None
            }
        };

        match &outcome {
            Ok(()) => info!(pod = target.pod(), "Exec session ended"),
            Err(e) => info!(pod = target.pod(), error = %e, "Exec session ended with error"),
        }

        SessionReport {
            outcome,
            sink,
            stream,
        }
    }
}

/// Client frames -> remote stdin and resize queue
async fn inbound_pump<St, E>(
    mut stream: St,
    mut stdin: DuplexStream,
    resize: ResizeSender,
    terminated: CancellationToken,
) -> St
where
    St: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            _ = terminated.cancelled() => break,
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                debug!(error = %e, "Client channel read failed");
                break;
            }
            None => break,
        };

        match TerminalMessage::decode(&text) {
            Ok(TerminalMessage::Input { data }) => {
                if let Err(e) = stdin.write_all(data.as_bytes()).await {
                    debug!(error = %e, "Remote stdin closed");
                    break;
                }
            }
            Ok(TerminalMessage::Resize { rows, cols }) => {
                if !resize.offer(TerminalSize::new(rows, cols)) {
                    debug!(rows, cols, "Resize dropped, previous one still pending");
                }
            }
            Ok(TerminalMessage::Output { .. }) => {}
            Err(e) => trace!(error = %e, "Discarding client frame"),
        }
    }

    // EOF on the remote's stdin
    let _ = stdin.shutdown().await;
    stream
}

/// Remote output -> `output` frames, until EOF or a failed write
async fn outbound_pump<Si>(mut sink: Si, mut stdout: DuplexStream, chunk_size: usize) -> Si
where
    Si: Sink<String> + Unpin,
    Si::Error: Display,
{
    let mut buf = vec![0u8; chunk_size];
    let mut decoder = Utf8Decoder::new();

    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Remote output read failed");
                break;
            }
        };

        let data = decoder.decode(&buf[..n]);
        if data.is_empty() {
            continue;
        }
        if !send_output(&mut sink, data).await {
            return sink;
        }
    }

    if let Some(tail) = decoder.finish() {
        send_output(&mut sink, tail).await;
    }
    sink
}

/// Send one `output` frame. Returns `false` once the client is gone.
async fn send_output<Si>(sink: &mut Si, data: String) -> bool
where
    Si: Sink<String> + Unpin,
    Si::Error: Display,
{
    let frame = match TerminalMessage::output(data).encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to encode output frame");
            return true;
        }
    };

    match sink.send(frame).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Client channel write failed");
            false
        }
    }
}

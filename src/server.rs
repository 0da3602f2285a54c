//! WebSocket front end for exec sessions
//!
//! Route: `ws://host:port/pods/<pod>/exec/ws?container=<name>[&namespace=<ns>]`
//!
//! The target is validated during the handshake, so a request without a
//! container is answered with a plain HTTP error and never upgraded.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use anyhow::Result;
use futures::{SinkExt, Stream, StreamExt, future};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use crate::config::Config;
use kubeterm_exec::{ExecSessionBridge, ExecTarget, KubeExec};
use kubeterm_k8s::ClusterSessionManager;

#[derive(Debug, Error, PartialEq, Eq)]
enum RouteError {
    #[error("Not found. Use /pods/<pod>/exec/ws?container=<name>")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),
}

impl RouteError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Resolve the exec target from the request URI. Query values are
/// percent-decoded; the pod segment is taken as is.
fn parse_exec_route(uri: &Uri, default_namespace: &str) -> Result<ExecTarget, RouteError> {
    let pod = uri
        .path()
        .strip_prefix("/pods/")
        .and_then(|rest| rest.strip_suffix("/exec/ws"))
        .filter(|pod| !pod.contains('/'))
        .ok_or(RouteError::NotFound)?;

    let mut container = String::new();
    let mut namespace = String::new();
    let query = uri.query().unwrap_or_default();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "container" => container = value.into_owned(),
            "namespace" => namespace = value.into_owned(),
            _ => {}
        }
    }

    if namespace.is_empty() {
        namespace = default_namespace.to_string();
    }

    ExecTarget::new(pod, namespace, container)
        .map_err(|e| RouteError::BadRequest(e.to_string()))
}

fn reject(err: &RouteError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = err.status();
    response
}

/// Text payloads of a WebSocket, ending at the first close frame.
/// Binary frames are read as UTF-8, control frames are skipped.
pub struct WsFrames<S> {
    inner: S,
}

impl<S> WsFrames<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Stream for WsFrames<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    type Item = Result<String, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let frame = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(Message::Text(text))) => Some(Ok(text)),
                Some(Ok(Message::Binary(data))) => {
                    Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Some(Ok(Message::Close(_))) | None => None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => Some(Err(e)),
            };
            return Poll::Ready(frame);
        }
    }
}

/// Accepts exec WebSocket connections and runs one bridge per connection
pub struct ExecServer {
    session: Arc<ClusterSessionManager>,
    config: Arc<Config>,
}

impl ExecServer {
    pub fn new(session: Arc<ClusterSessionManager>, config: Config) -> Self {
        Self {
            session,
            config: Arc::new(config),
        }
    }

    /// Serve until `shutdown` fires, then cancel and wait for open sessions
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Exec server listening");
        let sessions = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Exec server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let session = Arc::clone(&self.session);
                    let config = Arc::clone(&self.config);
                    let cancel = shutdown.child_token();
                    sessions.spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, session, config, cancel).await {
                            error!(error = %e, %addr, "WebSocket connection error");
                        }
                    });
                }
            }
        }

        sessions.close();
        sessions.wait().await;
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session: Arc<ClusterSessionManager>,
    config: Arc<Config>,
    cancel: CancellationToken,
) -> Result<()> {
    let binding = session.snapshot();
    let default_namespace = binding.namespace.clone();

    let routed = Arc::new(Mutex::new(None));
    let routed_cell = Arc::clone(&routed);

    let accepted = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        match parse_exec_route(req.uri(), &default_namespace) {
            Ok(target) => {
                *routed_cell.lock() = Some(target);
                Ok(resp)
            }
            Err(e) => Err(reject(&e)),
        }
    })
    .await;

    let ws = match accepted {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "Rejected exec connection");
            return Ok(());
        }
    };
    let Some(target) = routed.lock().take() else {
        return Ok(());
    };

    debug!(%addr, pod = target.pod(), "Upgraded exec connection");

    let remote = KubeExec::new(binding.client).with_command(config.shell.clone());
    let bridge = ExecSessionBridge::new(remote, target)
        .with_initial_size(config.initial_size())
        .with_chunk_size(config.terminal.chunk_size);

    let (ws_tx, ws_rx) = ws.split();
    let sink = ws_tx.with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text))));
    let report = bridge.run(sink, WsFrames::new(ws_rx), cancel).await;

    // The connection belongs to us, not to the bridge
    if let (Some(sink), Some(frames)) = (report.sink, report.stream) {
        if let Ok(mut ws) = frames.into_inner().reunite(sink.into_inner()) {
            let _ = ws.close(None).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use kube::config::Kubeconfig;
    use tokio_tungstenite::connect_async;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_exec_route() {
        let target = parse_exec_route(&uri("/pods/web-1/exec/ws?container=app"), "shop").unwrap();
        assert_eq!(target, ExecTarget::new("web-1", "shop", "app").unwrap());

        let target = parse_exec_route(
            &uri("/pods/web-1/exec/ws?namespace=ops&container=sidecar"),
            "shop",
        )
        .unwrap();
        assert_eq!(target.namespace(), "ops");
        assert_eq!(target.container(), "sidecar");
    }

    #[test]
    fn test_parse_exec_route_decodes_query_values() {
        let target = parse_exec_route(
            &uri("/pods/web-1/exec/ws?container=app%2Dv2&namespace=team%2Da"),
            "shop",
        )
        .unwrap();
        assert_eq!(target.container(), "app-v2");
        assert_eq!(target.namespace(), "team-a");

        let target =
            parse_exec_route(&uri("/pods/web-1/exec/ws?namespace=&container=app"), "shop").unwrap();
        assert_eq!(target.namespace(), "shop");
    }

    #[test]
    fn test_parse_exec_route_requires_container() {
        for path in [
            "/pods/web-1/exec/ws",
            "/pods/web-1/exec/ws?container=",
            "/pods/web-1/exec/ws?namespace=ops",
        ] {
            let err = parse_exec_route(&uri(path), "shop").unwrap_err();
            assert_eq!(err, RouteError::BadRequest("container is required".to_string()));
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_parse_exec_route_unknown_paths() {
        for path in ["/", "/pods/web-1/exec", "/pods/a/b/exec/ws?container=app", "/tasks"] {
            assert_eq!(
                parse_exec_route(&uri(path), "shop"),
                Err(RouteError::NotFound),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_reject_sets_status() {
        let response = reject(&RouteError::NotFound);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().as_deref().unwrap_or_default().contains("/exec/ws"));
    }

    #[tokio::test]
    async fn test_ws_frames_stop_at_close() {
        let messages = stream::iter(vec![
            Ok(Message::Ping(vec![1])),
            Ok(Message::Text("a".to_string())),
            Ok(Message::Binary(b"b".to_vec())),
            Ok(Message::Close(None)),
            Ok(Message::Text("late".to_string())),
        ]);

        let frames: Vec<String> = WsFrames::new(messages)
            .map(|frame| frame.unwrap())
            .collect()
            .await;
        assert_eq!(frames, vec!["a", "b"]);
    }

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: dev
  cluster:
    server: http://127.0.0.1:6443
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
    namespace: shop
current-context: dev
users:
- name: dev
  user:
    token: abc
"#;

    #[tokio::test]
    async fn test_handshake_rejects_missing_container() {
        let kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        let session = ClusterSessionManager::local(kubeconfig, None).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let server = ExecServer::new(Arc::new(session), Config::default());
        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));

        let err = connect_async(format!("ws://{}/pods/web-1/exec/ws", addr))
            .await
            .unwrap_err();
        match err {
            WsError::Http(response) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
            other => panic!("unexpected error: {}", other),
        }

        let err = connect_async(format!("ws://{}/nope", addr)).await.unwrap_err();
        match err {
            WsError::Http(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            other => panic!("unexpected error: {}", other),
        }

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}

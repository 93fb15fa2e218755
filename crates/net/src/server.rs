//! TCP server for the coordination service
//!
//! Every connection authenticates with `Hello` and then exchanges one
//! response per request. Requests are handed to a [`Handler`] on the
//! blocking pool since the storage layer is synchronous.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use bicanh_core::ErrorKind;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{Request, Response};

/// Default maximum number of concurrent connections
pub const MAX_CONNECTIONS: usize = 32;

/// Reason sent when the connection limit is reached
pub const SERVER_FULL: &str = "server full";

/// Time allowed between accept and the `Hello` frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Application side of the server
pub trait Handler: Send + Sync + 'static {
    /// Check the key presented in `Hello`
    fn authenticate(&self, api_key: &str) -> bool;

    /// Serve one authenticated request
    fn handle(&self, request: Request) -> Response;
}

/// Running server handle
pub struct Server {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start accepting connections
    pub async fn start(addr: SocketAddr, handler: Arc<dyn Handler>) -> Result<Self> {
        Self::start_with_limit(addr, handler, MAX_CONNECTIONS).await
    }

    pub async fn start_with_limit(
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
        max_connections: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, max_connections, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let connections = Arc::new(AtomicUsize::new(0));

        tokio::spawn(accept_loop(
            listener,
            handler,
            connections.clone(),
            max_connections,
            shutdown_tx.clone(),
        ));

        Ok(Server {
            addr: bound_addr,
            connections,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting and close open connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Decrements the connection count when a connection task ends
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    connections: Arc<AtomicUsize>,
    max_connections: usize,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if connections.load(Ordering::SeqCst) >= max_connections {
                            warn!(addr = %addr, "Connection limit reached");
                            tokio::spawn(refuse(stream, SERVER_FULL));
                            continue;
                        }
                        connections.fetch_add(1, Ordering::SeqCst);
                        let slot = ConnectionSlot(connections.clone());
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            slot,
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

async fn refuse(mut stream: TcpStream, reason: &str) {
    // Drain the Hello so the close is not turned into a reset
    let _ = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame::<Request, _>(&mut stream)).await;

    let msg = Response::Rejected {
        reason: reason.to_string(),
    };
    if let Err(e) = write_frame(&mut stream, &msg).await {
        debug!(error = %e, "Failed to send rejection");
    }
}

/// Handle a single client connection
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    _slot: ConnectionSlot,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream, &handler)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(addr = %addr, error = %e, "Handshake failed");
            return;
        }
        Err(_) => {
            warn!(addr = %addr, "Handshake timed out");
            return;
        }
    }

    info!(addr = %addr, "Client authenticated");

    loop {
        let request = tokio::select! {
            frame = read_frame::<Request, _>(&mut stream) => frame,
            _ = shutdown_rx.recv() => {
                debug!(addr = %addr, "Closing connection on shutdown");
                break;
            }
        };

        let response = match request {
            Ok(request) => dispatch(handler.clone(), request).await,
            Err(Error::ConnectionClosed) => {
                debug!(addr = %addr, "Client disconnected");
                break;
            }
            // Whole payload was read, the next frame starts on a boundary
            Err(Error::Protocol(message)) => Response::Error {
                kind: ErrorKind::Validation,
                message,
            },
            // Payload left unread, nothing after it can be trusted
            Err(Error::FrameSize(message)) => {
                warn!(addr = %addr, error = %message, "Dropping connection");
                break;
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Read failed");
                break;
            }
        };

        if let Err(e) = write_frame(&mut stream, &response).await {
            warn!(addr = %addr, error = %e, "Write failed");
            break;
        }
    }

    info!(addr = %addr, "Connection closed");
}

/// Run key verification on the blocking pool
async fn authenticate(handler: &Arc<dyn Handler>, api_key: String) -> bool {
    let handler = handler.clone();
    match tokio::task::spawn_blocking(move || handler.authenticate(&api_key)).await {
        Ok(accepted) => accepted,
        Err(e) => {
            error!(error = %e, "Authentication task failed");
            false
        }
    }
}

/// Expect `Hello` with a valid key and answer `Welcome`
async fn handshake(stream: &mut TcpStream, handler: &Arc<dyn Handler>) -> Result<()> {
    let first: Request = read_frame(stream).await?;

    let reason = match first {
        Request::Hello { api_key } => {
            if authenticate(handler, api_key).await {
                let welcome = Response::Welcome {
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                };
                return write_frame(stream, &welcome).await;
            }
            "invalid api key".to_string()
        }
        other => format!("expected Hello, got {}", other.name()),
    };

    write_frame(
        stream,
        &Response::Rejected {
            reason: reason.clone(),
        },
    )
    .await?;
    Err(Error::Rejected(reason))
}

/// Run one request against the handler
async fn dispatch(handler: Arc<dyn Handler>, request: Request) -> Response {
    let name = request.name();
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { .. } => Response::Error {
            kind: ErrorKind::Validation,
            message: "already authenticated".to_string(),
        },
        request => {
            debug!(request = name, "Dispatching");
            match tokio::task::spawn_blocking(move || handler.handle(request)).await {
                Ok(response) => response,
                Err(e) => {
                    error!(request = name, error = %e, "Handler task failed");
                    Response::Error {
                        kind: ErrorKind::Internal,
                        message: "request handler failed".to_string(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use tokio::io::AsyncWriteExt;
    use uuid::Uuid;

    struct MockHandler;

    impl Handler for MockHandler {
        fn authenticate(&self, api_key: &str) -> bool {
            api_key == "secret"
        }

        fn handle(&self, request: Request) -> Response {
            match request {
                Request::ListMembers => Response::Members { members: vec![] },
                Request::GetMeeting { meeting_id } => Response::Error {
                    kind: ErrorKind::NotFound,
                    message: format!("meeting {}", meeting_id),
                },
                _ => Response::Done,
            }
        }
    }

    async fn start(limit: usize) -> Server {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        Server::start_with_limit(addr, Arc::new(MockHandler), limit)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_and_ping() {
        let server = start(4).await;
        let mut client = Client::connect(server.addr(), "secret").await.unwrap();

        client.ping().await.unwrap();
        assert!(client.list_members().await.unwrap().is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_key_rejected() {
        let server = start(4).await;
        let result = Client::connect(server.addr(), "wrong").await;
        assert!(matches!(result, Err(Error::Rejected(_))));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_request_before_hello_rejected() {
        let server = start(4).await;
        let mut stream = TcpStream::connect(server.addr()).await.unwrap();

        write_frame(&mut stream, &Request::ListMembers).await.unwrap();
        let response: Response = read_frame(&mut stream).await.unwrap();
        assert!(matches!(response, Response::Rejected { .. }));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_kind() {
        let server = start(4).await;
        let mut client = Client::connect(server.addr(), "secret").await.unwrap();

        match client.get_meeting(Uuid::new_v4()).await {
            Err(Error::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
        server.shutdown();
    }

    async fn authenticated_stream(server: &Server) -> TcpStream {
        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        let hello = Request::Hello {
            api_key: "secret".into(),
        };
        write_frame(&mut stream, &hello).await.unwrap();
        let welcome: Response = read_frame(&mut stream).await.unwrap();
        assert!(matches!(welcome, Response::Welcome { .. }));
        stream
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let server = start(4).await;
        let mut stream = authenticated_stream(&server).await;

        // A Ping smuggled where the oversized payload should be
        let mut bytes = (2 * 1024 * 1024u32).to_be_bytes().to_vec();
        write_frame(&mut bytes, &Request::Ping).await.unwrap();
        stream.write_all(&bytes).await.unwrap();

        let reply = read_frame::<Response, _>(&mut stream).await;
        assert!(reply.is_err(), "connection stayed open: {:?}", reply);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_json_keeps_connection() {
        let server = start(4).await;
        let mut stream = authenticated_stream(&server).await;

        let mut bytes = 3u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{x}");
        write_frame(&mut bytes, &Request::Ping).await.unwrap();
        stream.write_all(&bytes).await.unwrap();

        let first: Response = read_frame(&mut stream).await.unwrap();
        assert!(matches!(
            first,
            Response::Error {
                kind: ErrorKind::Validation,
                ..
            }
        ));
        let second: Response = read_frame(&mut stream).await.unwrap();
        assert!(matches!(second, Response::Pong));
        server.shutdown();
    }

    /// Verifies "slow" keys the way a password hash would
    struct SlowHandler;

    impl Handler for SlowHandler {
        fn authenticate(&self, api_key: &str) -> bool {
            if api_key == "slow" {
                std::thread::sleep(Duration::from_secs(1));
            }
            api_key == "secret"
        }

        fn handle(&self, _request: Request) -> Response {
            Response::Done
        }
    }

    #[tokio::test]
    async fn test_slow_authentication_does_not_stall_others() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::start(addr, Arc::new(SlowHandler)).await.unwrap();

        let mut slow = TcpStream::connect(server.addr()).await.unwrap();
        let hello = Request::Hello {
            api_key: "slow".into(),
        };
        write_frame(&mut slow, &hello).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fast = tokio::time::timeout(Duration::from_millis(500), async {
            let mut client = Client::connect(server.addr(), "secret").await?;
            client.ping().await
        })
        .await;
        assert!(matches!(fast, Ok(Ok(()))));

        let rejected: Response = read_frame(&mut slow).await.unwrap();
        assert!(matches!(rejected, Response::Rejected { .. }));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = start(1).await;
        let _first = Client::connect(server.addr(), "secret").await.unwrap();

        let second = Client::connect(server.addr(), "secret").await;
        assert!(matches!(second, Err(Error::ServerFull)));
        server.shutdown();
    }
}

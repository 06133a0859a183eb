//! Proxy server: TCP listener, connection dispatch, and lifecycle.
//!
//! The server accepts TCP connections, reads one HTTP/1.1 request per
//! connection, and dispatches on the method:
//!
//! OPTIONS -> CORS preflight
//! POST    -> JSON envelope ([`Pipeline::handle_envelope`])
//! GET     -> raw resource for `?url=` ([`Pipeline::handle_resource`])
//!
//! Every reply closes the connection.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::fetch::{Fetcher, Upstream};
use crate::http;
use crate::pipeline::Pipeline;
use crate::response::Reply;
use pane::Validator;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Maximum total size of HTTP headers (64 KiB). Prevents OOM from
/// malicious clients sending unbounded header data.
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum request body size (1 MiB). A POST body only carries a URL.
const MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Handle returned when the proxy server starts.
///
/// Drop the handle or call [`ProxyHandle::shutdown`] to stop accepting
/// connections. Requests already in flight run to completion.
pub struct ProxyHandle {
    /// The actual port the proxy is listening on
    pub port: u16,
    /// The actual address the proxy is listening on
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl ProxyHandle {
    /// Signal the proxy to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// URL of the proxy endpoint on the listening address.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

/// Shared state for all connections.
struct ProxyState {
    pipeline: Pipeline,
    config: ProxyConfig,
    local_addr: SocketAddr,
    active_connections: AtomicUsize,
}

/// Start the proxy server with the reqwest-backed fetcher.
///
/// Binds to the configured address and begins accepting connections.
/// The server runs until the handle is dropped or `shutdown()` is called.
pub async fn start(config: ProxyConfig) -> Result<ProxyHandle> {
    config.validate()?;
    let fetcher = Fetcher::new(&config)?;
    start_with_upstream(config, Arc::new(fetcher)).await
}

/// Start the proxy server with a caller-supplied upstream.
pub async fn start_with_upstream(
    config: ProxyConfig,
    upstream: Arc<dyn Upstream>,
) -> Result<ProxyHandle> {
    let pipeline = Pipeline::new(Validator::new(config.host_filter()), upstream);

    // Bind listener
    let bind_addr = SocketAddr::new(config.bind_addr, config.bind_port);
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ProxyError::Bind {
            addr: bind_addr.to_string(),
            source: e,
        })?;

    let local_addr = listener.local_addr().map_err(|e| ProxyError::Bind {
        addr: bind_addr.to_string(),
        source: e,
    })?;

    info!("Proxy server listening on {}", local_addr);

    // Shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = Arc::new(ProxyState {
        pipeline,
        config,
        local_addr,
        active_connections: AtomicUsize::new(0),
    });

    // Spawn accept loop as a task within the current runtime.
    // The caller MUST keep this runtime driven for the server to make progress.
    tokio::spawn(accept_loop(listener, state, shutdown_rx));

    Ok(ProxyHandle {
        port: local_addr.port(),
        addr: local_addr,
        shutdown_tx,
    })
}

/// Accept loop: listen for connections until shutdown.
async fn accept_loop(
    listener: TcpListener,
    state: Arc<ProxyState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        // Connection limit enforcement
                        let max = state.config.max_connections;
                        if max > 0 {
                            let current = state.active_connections.load(Ordering::Relaxed);
                            if current >= max {
                                warn!("Connection limit reached ({}/{}), rejecting {}", current, max, addr);
                                drop(stream);
                                continue;
                            }
                        }
                        state.active_connections.fetch_add(1, Ordering::Relaxed);

                        debug!("Accepted connection from {}", addr);
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &state).await {
                                debug!("Connection handler error: {}", e);
                            }
                            state.active_connections.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                // A dropped handle counts as a shutdown request.
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Proxy server shutting down");
                    return;
                }
            }
        }
    }
}

/// Handle a single client connection: one request, one reply.
async fn handle_connection(mut stream: TcpStream, state: &ProxyState) -> Result<()> {
    // The BufReader stays alive until the whole head is consumed; it may
    // read ahead into the body.
    let mut buf_reader = BufReader::new(&mut stream);
    let mut budget = MAX_HEADER_SIZE as u64;
    let mut first_line = Vec::new();
    let mut header_bytes = Vec::new();
    loop {
        let mut line = Vec::new();
        let n = (&mut buf_reader)
            .take(budget)
            .read_until(b'\n', &mut line)
            .await?;
        budget -= n as u64;

        if !line.ends_with(b"\n") {
            if budget == 0 {
                drop(buf_reader);
                let reply = Reply::error(431, "Request headers too large");
                return write_reply(&mut stream, &reply).await;
            }
            if first_line.is_empty() && line.is_empty() {
                return Ok(()); // Client disconnected
            }
        }

        if first_line.is_empty() {
            first_line = line;
        } else if line.iter().all(u8::is_ascii_whitespace) {
            break;
        } else {
            header_bytes.extend_from_slice(&line);
        }
        if n == 0 {
            break;
        }
    }

    // Bytes the BufReader read past the headers belong to the body.
    let buffered = buf_reader.buffer().to_vec();
    drop(buf_reader);

    let parsed = std::str::from_utf8(&first_line)
        .map_err(|e| ProxyError::HttpParse(format!("request line is not UTF-8: {e}")))
        .and_then(|line| http::parse_request_line(line.trim_end()))
        .and_then(|parts| match std::str::from_utf8(&header_bytes) {
            Ok(_) => Ok(parts),
            Err(e) => Err(ProxyError::HttpParse(format!("headers are not UTF-8: {e}"))),
        });
    let (method, target, _version) = match parsed {
        Ok(parts) => parts,
        Err(e) => {
            debug!("{}", e);
            return write_reply(&mut stream, &Reply::error(400, "Malformed request")).await;
        }
    };
    debug!("{} {}", method, target);

    let endpoint = http::endpoint_for(
        state.config.public_endpoint.as_deref(),
        http::header_value(&header_bytes, "host"),
        &state.local_addr.to_string(),
        &target,
    );

    let reply = match method.as_str() {
        "OPTIONS" => Reply::preflight(),
        "POST" => {
            let content_length = http::extract_content_length(&header_bytes).unwrap_or(0);
            if content_length > MAX_REQUEST_BODY {
                Reply::error(413, "Request body too large")
            } else {
                let body = read_body(&mut stream, buffered, content_length).await?;
                let work = state.pipeline.handle_envelope(&body, &endpoint);
                match until_disconnect(&mut stream, work).await {
                    Some(reply) => reply,
                    None => return Ok(()),
                }
            }
        }
        "GET" => {
            let raw_url = http::query_param(&target, "url");
            let work = state.pipeline.handle_resource(raw_url.as_deref(), &endpoint);
            match until_disconnect(&mut stream, work).await {
                Some(reply) => reply,
                None => return Ok(()),
            }
        }
        _ => Reply::error(405, "Method not allowed"),
    };

    write_reply(&mut stream, &reply).await
}

/// Read a `Content-Length` body, starting with the bytes already buffered.
async fn read_body(
    stream: &mut TcpStream,
    mut body: Vec<u8>,
    content_length: usize,
) -> Result<Vec<u8>> {
    if body.len() >= content_length {
        body.truncate(content_length);
        return Ok(body);
    }
    let mut rest = vec![0u8; content_length - body.len()];
    stream.read_exact(&mut rest).await?;
    body.extend_from_slice(&rest);
    Ok(body)
}

/// Drive `work` to completion unless the client goes away first, in which
/// case the work (and any upstream fetch in it) is dropped.
async fn until_disconnect<F>(stream: &mut TcpStream, work: F) -> Option<Reply>
where
    F: std::future::Future<Output = Reply>,
{
    tokio::select! {
        reply = work => Some(reply),
        () = client_gone(stream) => {
            debug!("Client disconnected, abandoning request");
            None
        }
    }
}

async fn client_gone(stream: &mut TcpStream) {
    let mut scratch = [0u8; 512];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn write_reply(stream: &mut TcpStream, reply: &Reply) -> Result<()> {
    stream.write_all(&reply.to_http()).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;
    Ok(())
}

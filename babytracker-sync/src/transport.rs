//! TCP transport: the listener side and the connector side of an exchange.
//!
//! Every connection carries one request line and at most one response
//! line. Store work runs on the blocking pool so a slow disk never stalls
//! the accept loop.

use crate::codec::{read_line_limited, write_line};
use crate::config::SyncConfig;
use crate::engine::{Reply, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Response, SyncMessage};
use babytracker_storage::SyncStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

async fn with_timeout<T, F>(duration: Duration, what: &'static str, fut: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| SyncError::Timeout(what))?
}

/// Binds the sync listener.
pub async fn bind(addr: SocketAddr) -> SyncResult<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sync listener bound");
    Ok(listener)
}

/// Accepts connections until the task is aborted, serving each on its own
/// task.
pub fn spawn_listener<S>(
    listener: TcpListener,
    engine: Arc<SyncEngine<S>>,
    config: Arc<SyncConfig>,
) -> JoinHandle<()>
where
    S: SyncStore + Send + Sync + 'static + ?Sized,
{
    tokio::spawn(async move {
        let mut failures = 0u32;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    failures = 0;
                    let engine = Arc::clone(&engine);
                    let config = Arc::clone(&config);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, engine, &config).await {
                            warn!(%peer, error = %e, "incoming sync failed");
                        }
                    });
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let backoff = accept_backoff(failures);
                    warn!(error = %e, ?backoff, "accept failed");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

/// Pause before retrying `accept` after consecutive failures.
///
/// Doubles from 50 ms and caps at one second, so a persistent error such
/// as running out of file descriptors cannot spin the accept loop.
pub fn accept_backoff(failures: u32) -> Duration {
    const BASE_MS: u64 = 50;
    const MAX_MS: u64 = 1_000;
    let shift = failures.saturating_sub(1).min(10);
    Duration::from_millis((BASE_MS << shift).min(MAX_MS))
}

/// Serves one incoming connection: read request, merge, answer.
///
/// Oversized or malformed requests close the connection without an answer.
pub async fn serve_connection<S>(
    stream: TcpStream,
    engine: Arc<SyncEngine<S>>,
    config: &SyncConfig,
) -> SyncResult<()>
where
    S: SyncStore + Send + Sync + 'static + ?Sized,
{
    let peer = stream.peer_addr()?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let line = with_timeout(
        config.io_timeout,
        "read",
        read_line_limited(&mut reader, config.limits.max_message_bytes),
    )
    .await?;
    let request = SyncMessage::from_line(&line)?;
    debug!(%peer, device = %request.device_id, "request received");

    let reply = tokio::task::spawn_blocking(move || engine.handle_incoming(request)).await??;

    match &reply {
        Reply::Data(snapshot) => {
            with_timeout(config.io_timeout, "write", write_line(&mut write_half, snapshot)).await?;
            debug!(%peer, events = snapshot.events.len(), "sent snapshot");
        }
        Reply::Rejected(rejection) => {
            with_timeout(config.io_timeout, "write", write_line(&mut write_half, rejection)).await?;
            debug!(%peer, "sent approval rejection");
        }
    }
    Ok(())
}

/// Dials `addr`, sends `request` and reads the single response line.
///
/// Only the connect and per-socket timeouts are applied here; the caller
/// bounds the whole exchange.
pub async fn exchange(addr: SocketAddr, request: &SyncMessage, config: &SyncConfig) -> SyncResult<Response> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SyncError::Timeout("connect"))??;
    debug!(%addr, "connected");

    let (read_half, mut write_half) = stream.into_split();
    with_timeout(config.io_timeout, "write", write_line(&mut write_half, request)).await?;

    let mut reader = BufReader::new(read_half);
    let line = with_timeout(
        config.io_timeout,
        "read",
        read_line_limited(&mut reader, config.limits.max_message_bytes),
    )
    .await?;
    Response::from_line(&line)
}

//! WebSocket server: accept loop, per-connection tasks and the liveness timer.
//!
//! Each accepted connection gets:
//!
//! - a **writer** task draining the connection's outbound queue into the
//!   WebSocket sink;
//! - a **reader** loop passing every text frame (or UTF-8 binary frame) to
//!   [`RelayEngine::handle_frame`], one frame at a time.
//!
//! When either side ends, or the engine asks the connection to close (liveness
//! expiry), the engine is told the connection closed and both tasks stop.
//!
//! Shutdown is driven by a shared `AtomicBool` that `main.rs` clears on
//! Ctrl+C; the accept loop and the liveness timer poll it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{ConnectionHandle, OutboundFrame, RelayEngine};
use crate::domain::ServerConfig;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Time the writer gets to flush a requested close frame before it is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(
    config: ServerConfig,
    engine: Arc<RelayEngine>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("linkrelay listening on {}", config.bind_addr);
    serve(listener, &config, engine, running).await
}

/// Accepts connections on an already-bound listener until `running` is
/// cleared.  Also drives the liveness sweep when `config.ping_interval` is
/// set.
pub async fn serve(
    listener: TcpListener,
    config: &ServerConfig,
    engine: Arc<RelayEngine>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    if let Some(every) = config.ping_interval {
        tokio::spawn(run_liveness(every, Arc::clone(&engine), Arc::clone(&running)));
    } else {
        info!("liveness sweep disabled");
    }

    let buffer = config.outbound_buffer;
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    handle_device_session(stream, peer_addr, engine, buffer).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Liveness ──────────────────────────────────────────────────────────────────

async fn run_liveness(every: Duration, engine: Arc<RelayEngine>, running: Arc<AtomicBool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick is immediate

    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let expired = engine.liveness_sweep().await;
        if !expired.is_empty() {
            info!("liveness sweep expired {} connection(s)", expired.len());
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_device_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<RelayEngine>,
    buffer: usize,
) {
    match run_session(stream, peer_addr, engine, buffer).await {
        Ok(()) => debug!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<RelayEngine>,
    buffer: usize,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (conn, mut rx) = ConnectionHandle::new(Some(peer_addr), buffer);
    let conn_id = conn.id();
    let close_signal = conn.clone();
    info!("connection {conn_id} established from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer: outbound queue → WebSocket ────────────────────────────────────
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                        debug!("connection {conn_id}: send failed: {e}");
                        break;
                    }
                }
                OutboundFrame::Close => {
                    debug!("connection {conn_id}: closing on request");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    // ── Reader: WebSocket → engine ────────────────────────────────────────────
    let reader = async {
        loop {
            let msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("connection {conn_id}: closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    warn!("connection {conn_id}: WebSocket error: {e}");
                    break;
                }
                None => break,
            };

            match msg {
                WsMessage::Text(text) => engine.handle_frame(&conn, &text).await,
                WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => engine.handle_frame(&conn, &text).await,
                    Err(_) => warn!("connection {conn_id}: non-UTF-8 binary frame dropped"),
                },
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                WsMessage::Close(_) => {
                    debug!("connection {conn_id}: close frame received");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = &mut writer => {
            debug!("connection {conn_id}: writer ended");
        }
        _ = close_signal.close_requested() => {
            debug!("connection {conn_id}: close requested");
            if timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                debug!("connection {conn_id}: writer stuck; dropping transport");
            }
        }
    }

    engine.connection_closed(conn_id).await;
    writer.abort();
    info!("connection {conn_id} from {peer_addr} closed");
    Ok(())
}

//! Per-session control socket.
//!
//! The listener connects here to inject remote input into the PTY.
//! Protocol: connect, send UTF-8 bytes terminated by a newline, close.
//! The trailing newline is stripped and the bytes are written to the
//! PTY master verbatim; no response is sent — the agent observes the
//! effect in its normal input stream.

use std::path::PathBuf;

use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Bound on a single injected payload.
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Bind the control socket (unlinking a stale file from a prior run)
/// and forward every received payload to `writer_tx`. Runs until the
/// writer side closes.
pub async fn serve(socket_path: PathBuf, writer_tx: mpsc::Sender<Vec<u8>>) -> std::io::Result<()> {
    if socket_path.exists() {
        info!("removing stale control socket {}", socket_path.display());
        std::fs::remove_file(&socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!("control socket listening on {}", socket_path.display());

    loop {
        let (stream, _addr) = listener.accept().await?;
        let writer_tx = writer_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, writer_tx).await {
                warn!("control connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    writer_tx: mpsc::Sender<Vec<u8>>,
) -> std::io::Result<()> {
    let mut payload = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        payload.extend_from_slice(&buf[..n]);
        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!("control payload exceeds {MAX_PAYLOAD_BYTES} bytes, dropping");
            return Ok(());
        }
    }
    if payload.last() == Some(&b'\n') {
        payload.pop();
    }
    if payload.is_empty() {
        return Ok(());
    }
    debug!("injecting {} bytes into pty", payload.len());
    let _ = writer_tx.send(payload).await;
    Ok(())
}

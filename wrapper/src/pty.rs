//! PTY ownership: spawn the agent, pump its output, accept writes.

use std::io::ErrorKind;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;

pub type Result<T> = std::result::Result<T, PtyError>;

#[derive(thiserror::Error, Debug)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    Open(String),

    #[error("failed to spawn agent: {0}")]
    Spawn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running agent under a PTY. Output chunks arrive on `output_rx`,
/// writes go through `writer_tx` (injected remote input and the user's
/// own keystrokes share the same channel, so ordering is write-order).
pub struct PtySession {
    pub writer_tx: mpsc::Sender<Vec<u8>>,
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    master: Box<dyn MasterPty + Send>,
}

impl PtySession {
    pub fn resize(&self, size: PtySize) {
        if let Err(e) = self.master.resize(size) {
            debug!("pty resize failed: {e}");
        }
    }
}

/// Spawn `program` with `args` under a fresh PTY of the given size.
/// Returns the session plus a receiver resolved with the exit code.
pub fn spawn_agent(
    program: &str,
    args: &[String],
    cwd: &std::path::Path,
    size: PtySize,
) -> Result<(PtySession, oneshot::Receiver<i32>)> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(size)
        .map_err(|e| PtyError::Open(e.to_string()))?;

    let mut command = CommandBuilder::new(program);
    command.args(args);
    command.cwd(cwd);

    let mut child: Box<dyn Child + Send + Sync> = pair
        .slave
        .spawn_command(command)
        .map_err(|e| PtyError::Spawn(e.to_string()))?;
    // The slave fd is the child's side; dropping our handle here keeps
    // reads from blocking forever after the child exits.
    drop(pair.slave);

    // Reader: drain the PTY on a blocking thread and forward chunks.
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| PtyError::Open(e.to_string()))?;
    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                Err(_) => break,
            }
        }
        debug!("pty reader finished");
    });

    // Writer: apply writes to the PTY master on a blocking thread.
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| PtyError::Open(e.to_string()))?;
    let writer = Arc::new(StdMutex::new(writer));
    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
    tokio::spawn(async move {
        while let Some(bytes) = writer_rx.recv().await {
            let writer = writer.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Ok(mut guard) = writer.lock() {
                    use std::io::Write;
                    let _ = guard.write_all(&bytes);
                    let _ = guard.flush();
                }
            })
            .await;
        }
    });

    // Wait for the child and surface its exit code.
    let (exit_tx, exit_rx) = oneshot::channel::<i32>();
    tokio::task::spawn_blocking(move || {
        let code = match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(_) => -1,
        };
        let _ = exit_tx.send(code);
    });

    Ok((
        PtySession {
            writer_tx,
            output_rx,
            master: pair.master,
        },
        exit_rx,
    ))
}

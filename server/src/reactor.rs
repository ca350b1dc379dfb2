//! The connection loop: accepts sockets and runs one session per
//! connection, all serialized against a single shared [`Filesystem`] via a
//! blocking mutex, so only one command is ever in flight against the disk
//! at a time, even though each connection gets its own task. The mutex
//! never stays locked across an `.await`: every filesystem call is
//! synchronous, so locking it blocks this thread exactly as long as the
//! disk RPCs underneath it take — a slow disk pauses every client, for the
//! whole process, not just one task.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::Context;
use log::{info, warn};
use myfs_block::BlockDevice;
use myfs_core::fs::{Filesystem, Session};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use crate::dispatcher::{dispatch, Outcome};

/// Runs the accept loop against `listen_addr` until the process is killed.
/// Connections beyond `max_sessions` concurrently connected clients are
/// rejected rather than queued.
pub async fn run<D>(
    listen_addr: &str,
    fs: Filesystem<D>,
    max_sessions: usize,
    ninodes: u32,
) -> anyhow::Result<()>
where
    D: BlockDevice + Send + 'static,
{
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    info!("listening on {listen_addr}");

    let fs = Arc::new(Mutex::new(fs));
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (socket, peer) = listener.accept().await.context("accepting connection")?;
        if active.fetch_add(1, Ordering::SeqCst) >= max_sessions {
            active.fetch_sub(1, Ordering::SeqCst);
            warn!("rejecting {peer}: at capacity ({max_sessions} sessions)");
            drop(socket);
            continue;
        }
        info!("accepted connection from {peer}");
        let fs = Arc::clone(&fs);
        let active = Arc::clone(&active);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &fs, ninodes).await {
                warn!("session with {peer} aborted: {e}");
            }
            active.fetch_sub(1, Ordering::SeqCst);
            info!("closed connection from {peer}");
        });
    }
}

async fn handle_connection<D>(
    socket: TcpStream,
    fs: &Arc<Mutex<Filesystem<D>>>,
    ninodes: u32,
) -> anyhow::Result<()>
where
    D: BlockDevice,
{
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut session = Session::new();
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await.context("reading line")?;
        if n == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }

        let outcome = {
            let mut fs = fs.lock().expect("filesystem mutex poisoned");
            dispatch(&mut fs, &mut session, trimmed, ninodes)?
        };

        match outcome {
            Outcome::Reply(text) => {
                writer.write_all(text.as_bytes()).await?;
            }
            Outcome::Body(body) => {
                writer.write_all(&body).await?;
            }
            Outcome::Close(text) => {
                writer.write_all(text.as_bytes()).await?;
                return Ok(());
            }
        }
    }
}

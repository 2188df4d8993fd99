//! Transports that deliver reconfiguration lines to the engine.
//!
//! The daemon accepts one message per line:
//!
//! ```text
//! $ echo "50 150 10 40" | socat - UNIX-CONNECT:/run/latency-daemon.sock
//! ```
//!
//! Any number of writers may connect; each connection is read line by line on
//! its own task and every line is forwarded to the
//! [`ReconfigurationChannel`](crate::application::reconfigure::ReconfigurationChannel)
//! through one `mpsc` channel, so updates are applied in arrival order.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest accepted line in bytes.
const MAX_LINE_LEN: usize = 256;

/// Error type for reconfiguration transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind control socket at {path}: {source}")]
    BindFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Forwards every line read from `reader` to `tx`.
///
/// A line longer than [`MAX_LINE_LEN`] bytes, or one that is not UTF-8, is
/// dropped whole; no more than `MAX_LINE_LEN + 1` bytes of it are buffered.
/// Returns the number of lines forwarded once the reader hits end of input or
/// the receiver is dropped.
///
/// # Errors
///
/// Returns the I/O error if reading fails.
pub async fn forward_lines<R>(mut reader: R, tx: &mpsc::Sender<String>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(MAX_LINE_LEN + 1);
    let mut forwarded = 0;
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }

        let terminated = buf.last() == Some(&b'\n');
        if terminated {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if read > MAX_LINE_LEN {
            let dropped = read + discard_line(&mut reader).await?;
            warn!("dropping reconfiguration line of {dropped} bytes (limit {MAX_LINE_LEN})");
            continue;
        }

        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => line,
            Err(_) => {
                warn!("dropping reconfiguration line that is not UTF-8");
                continue;
            }
        };
        if tx.send(line).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

/// Consumes input up to and including the next newline.  Returns the bytes skipped.
async fn discard_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        skipped += used;
        if done {
            return Ok(skipped);
        }
    }
}

/// A listening Unix control socket.  Removes its socket file on [`close`](Self::close).
#[cfg(unix)]
pub struct ControlSocket {
    path: PathBuf,
    task: JoinHandle<()>,
}

#[cfg(unix)]
impl ControlSocket {
    /// Binds `path` and starts accepting connections.
    ///
    /// A stale socket file left by a previous run is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the socket cannot be bound.
    pub fn bind(path: &Path, tx: mpsc::Sender<String>) -> Result<Self, TransportError> {
        use tokio::io::BufReader;
        use tokio::net::UnixListener;

        match std::fs::remove_file(path) {
            Ok(()) => debug!("removed stale control socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TransportError::BindFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let listener = UnixListener::bind(path).map_err(|source| TransportError::BindFailed {
            path: path.to_path_buf(),
            source,
        })?;
        info!("control socket listening at {}", path.display());

        let task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("control socket accept failed: {e}");
                        continue;
                    }
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    match forward_lines(BufReader::new(stream), &tx).await {
                        Ok(n) => debug!("control connection closed after {n} lines"),
                        Err(e) => warn!("control connection read failed: {e}"),
                    }
                });
            }
        });

        Ok(Self {
            path: path.to_path_buf(),
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops accepting connections and removes the socket file.
    pub fn close(self) {
        self.task.abort();
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("could not remove control socket {}: {e}", self.path.display());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_lines_sends_each_line_in_order() {
        // Arrange
        let input: &[u8] = b"1 2 3 4\n5 6 7 8 9 1\n";
        let (tx, mut rx) = mpsc::channel(8);

        // Act
        let forwarded = forward_lines(input, &tx).await.unwrap();

        // Assert
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await.as_deref(), Some("1 2 3 4"));
        assert_eq!(rx.recv().await.as_deref(), Some("5 6 7 8 9 1"));
    }

    #[tokio::test]
    async fn test_forward_lines_drops_oversized_line_whole() {
        // Arrange – five tokens, the last one past the length limit
        let input = format!("10 20 30 40{} 99\n1 2 3 4\n", " ".repeat(300));
        let (tx, mut rx) = mpsc::channel(4);

        // Act
        let forwarded = forward_lines(input.as_bytes(), &tx).await.unwrap();
        drop(tx);

        // Assert – only the following valid line gets through
        assert_eq!(forwarded, 1);
        assert_eq!(rx.recv().await.as_deref(), Some("1 2 3 4"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_forward_lines_accepts_line_at_the_limit() {
        let exact = "7".repeat(MAX_LINE_LEN);
        let input = format!("{exact}\n{}", "8".repeat(MAX_LINE_LEN + 1));
        let (tx, mut rx) = mpsc::channel(4);

        let forwarded = forward_lines(input.as_bytes(), &tx).await.unwrap();

        assert_eq!(forwarded, 1);
        assert_eq!(rx.recv().await, Some(exact));
    }

    #[tokio::test]
    async fn test_forward_lines_keeps_unterminated_last_line() {
        let (tx, mut rx) = mpsc::channel(1);

        let forwarded = forward_lines(&b"5 6 7 8"[..], &tx).await.unwrap();

        assert_eq!(forwarded, 1);
        assert_eq!(rx.recv().await.as_deref(), Some("5 6 7 8"));
    }

    #[tokio::test]
    async fn test_forward_lines_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let forwarded = forward_lines(&b"1 2 3 4\n"[..], &tx).await.unwrap();

        assert_eq!(forwarded, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_control_socket_delivers_lines_from_a_client() {
        use tokio::io::AsyncWriteExt;
        use tokio::net::UnixStream;

        // Arrange
        let path = std::env::temp_dir().join(format!("latency-ctl-{}.sock", std::process::id()));
        let (tx, mut rx) = mpsc::channel(4);
        let socket = ControlSocket::bind(&path, tx).unwrap();

        // Act
        let mut client = UnixStream::connect(&path).await.unwrap();
        client.write_all(b"10 20 30 40\n").await.unwrap();
        client.shutdown().await.unwrap();

        // Assert
        assert_eq!(rx.recv().await.as_deref(), Some("10 20 30 40"));
        socket.close();
        assert!(!path.exists());
    }
}

//! TCP transport.
//!
//! One request and one response per connection, each a single JSON object
//! terminated by `\n`. The listener side lives in [`TcpTransport`]; both
//! sides share [`read_line`].

use std::net::SocketAddr;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    net::{TcpListener, TcpStream},
};

use crate::error::ServerError;

/// Listening TCP socket.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (e.g. `"0.0.0.0:5001"`, or port 0 for ephemeral).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("TCP transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Read bytes up to and including the first `\n`.
///
/// Reads at most `max + 1` bytes so that an oversized line is detected by the
/// decoder instead of buffered without bound. Returns `None` when the peer
/// closed without sending anything.
pub async fn read_line<R>(reader: R, max: usize) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let mut reader = BufReader::new(reader.take(limit));
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;

    if line.is_empty() { Ok(None) } else { Ok(Some(line)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_binds_ephemeral_port() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
        let addr = transport.local_addr().expect("local addr");
        assert_ne!(addr.port(), 0, "Should have assigned a port");
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = TcpTransport::bind("invalid:address:format").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn read_line_stops_at_newline() {
        let input: &[u8] = b"{\"type\":\"PING\"}\ntrailing";
        let line = read_line(input, 1024).await.expect("read");
        assert_eq!(line.as_deref(), Some(&b"{\"type\":\"PING\"}\n"[..]));
    }

    #[tokio::test]
    async fn read_line_caps_length() {
        let input = vec![b'x'; 64];
        let line = read_line(&input[..], 16).await.expect("read").expect("some bytes");
        assert_eq!(line.len(), 17);
    }

    #[tokio::test]
    async fn read_line_reports_closed_peer() {
        let input: &[u8] = b"";
        assert_eq!(read_line(input, 16).await.expect("read"), None);
    }
}

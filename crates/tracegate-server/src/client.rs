//! Outbound request helper.
//!
//! Used by the coordinator to reach resource nodes and by the harness to
//! drive experiments. Every call is bounded by a timeout covering connect,
//! send and receive.

use std::time::Duration;

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracegate_proto::{
    MAX_LINE_BYTES, ProtocolError, Request, Response, decode_response, encode_line,
};

use crate::transport::read_line;

/// Errors from one outbound request.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connect, write or read failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete response within the timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Response could not be decoded
    #[error("bad response: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer closed the connection without answering
    #[error("connection closed before a response arrived")]
    Closed,
}

/// Send one request to `addr` and wait for its response.
pub async fn send_request(
    addr: &str,
    request: &Request,
    timeout: Duration,
) -> Result<Response, ClientError> {
    tokio::time::timeout(timeout, exchange(addr, request))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

/// Whether a TCP connection to `addr` can be opened within `timeout`.
pub async fn is_alive(addr: &str, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

async fn exchange(addr: &str, request: &Request) -> Result<Response, ClientError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&encode_line(request)?).await?;

    let line = read_line(&mut stream, MAX_LINE_BYTES).await?.ok_or(ClientError::Closed)?;
    Ok(decode_response(&line)?)
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;

    #[tokio::test]
    async fn times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        // Accept and hold the connection open without answering.
        let silent = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf).await;
        });

        let result = send_request(&addr, &Request::Ping, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        silent.abort();
    }

    #[tokio::test]
    async fn liveness_check_fails_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        assert!(!is_alive(&addr, Duration::from_millis(200)).await);
    }
}

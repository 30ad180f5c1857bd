//! A minimal scripted HTTP/1.1 server for integration tests.
//!
//! Grounded on the teacher's `src/testserver.rs`: bind an ephemeral
//! `127.0.0.1` port and reply with scripted byte sequences. Each accepted
//! connection is handed exactly one response from the script, in order; the
//! request itself is read and discarded up to the blank line terminating the
//! headers (none of these tests assert on request bytes).

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a server that replies to each of `responses.len()` accepted
/// connections, in order, with the corresponding raw HTTP/1.1 response
/// bytes (status line, headers, body — caller supplies `\r\n` framing).
/// Returns the address to connect to.
pub async fn spawn_scripted(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            drain_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    format!("{}:{}", addr.ip(), addr.port())
}

async fn drain_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = [0u8; 4096];
    let mut seen = Vec::new();
    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        seen.extend_from_slice(&buf[..n]);
        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
}

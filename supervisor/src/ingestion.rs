//! Route and dynamic-obstacle ingestion over TCP (spec §6, §4.5.2).
//!
//! One connection per message, UTF-8 JSON read to EOF. A dedicated port per
//! message schema (route vs. obstacle) keeps the two distinguishable on one
//! byte-oriented TCP stream, since §6 only specifies "one message per
//! connection" and leaves the framing choice open.

use crate::error::AppError;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// `agent_id -> ordered list of target waypoint names` (spec §6).
pub type RouteMessage = HashMap<String, Vec<String>>;

/// `{ agent_id, blocked: [[dx,dy], ...] }` in the reporter's local frame (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleMessage {
    pub agent_id: String,
    pub blocked: Vec<(i64, i64)>,
}

/// Accept connections on `listener`, parse each as `T`, and forward
/// successfully-parsed messages through `tx`. Malformed JSON is
/// `MalformedInput` (spec §7): logged at error level, connection dropped,
/// state unchanged.
pub async fn run_listener<T>(listener: TcpListener, tx: mpsc::UnboundedSender<T>)
where
    T: for<'de> Deserialize<'de> + Send + 'static,
{
    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("ingestion accept failed: {}", e);
                continue;
            }
        };

        let tx = tx.clone();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = socket.read_to_end(&mut buf).await {
                tracing::error!("ingestion read failed from {}: {}", peer, e);
                return;
            }
            match serde_json::from_slice::<T>(&buf) {
                Ok(message) => {
                    let _ = tx.send(message);
                }
                Err(e) => {
                    // No response channel exists on this byte-oriented TCP
                    // connection, so `AppError::MalformedInput` is raised
                    // purely to log through its `IntoResponse`-paired
                    // `error!` path rather than ad hoc formatting.
                    let err = AppError::MalformedInput(e.to_string());
                    tracing::error!("malformed input from {}: {}", peer, err);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn well_formed_route_message_is_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<RouteMessage>();
        tokio::spawn(run_listener(listener, tx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(br#"{"A": ["dock-1", "dock-2"]}"#).await.unwrap();
        stream.shutdown().await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.get("A").unwrap(), &vec!["dock-1".to_string(), "dock-2".to_string()]);
    }

    #[tokio::test]
    async fn malformed_message_is_dropped_not_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<RouteMessage>();
        tokio::spawn(run_listener(listener, tx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"not json").await.unwrap();
        stream.shutdown().await.unwrap();

        // Give the accept/parse task a moment, then confirm nothing arrived.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}

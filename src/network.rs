use crate::config::DEFAULT_MAX_MESSAGE_BYTES;
use crate::sync::SyncReport;
use crate::types::{DynamoError, Message};
use crate::DynamoNode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, info, warn};

/// Accepts one request per connection and answers it from the local store.
pub struct NetworkServer {
    node: Arc<DynamoNode>,
}

impl NetworkServer {
    pub fn new(node: Arc<DynamoNode>) -> Self {
        Self { node }
    }

    /// Recovers local state from the ring, then binds the node's endpoint and
    /// serves forever. The endpoint stays unbound until recovery finishes, so
    /// peers see a refused connection rather than a queued request.
    pub async fn start(self) -> Result<(), DynamoError> {
        let report = self.recover().await?;
        let listener = TcpListener::bind(self.node.endpoint()).await?;
        info!(addr = %self.node.endpoint(), ?report, "recovered, accepting requests");
        self.serve(listener).await
    }

    /// Optionally wipes the local store, then runs anti-entropy.
    async fn recover(&self) -> Result<SyncReport, DynamoError> {
        if self.node.config().wipe_on_start {
            let dropped = self.node.store().delete_all()?;
            debug!(dropped, "local store wiped before sync");
        }
        self.node.sync().await
    }

    async fn serve(self, listener: TcpListener) -> Result<(), DynamoError> {
        let timeout = self.node.config().request_timeout();
        let max_bytes = self.node.config().max_message_bytes;

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            debug!(%peer_addr, "accepted connection");

            let node = Arc::clone(&self.node);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, node, timeout, max_bytes).await {
                    warn!(%peer_addr, error = %e, "error handling connection");
                }
            });
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    node: Arc<DynamoNode>,
    timeout: Duration,
    max_bytes: u64,
) -> Result<(), DynamoError> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader.take(max_bytes));

    let mut line = String::new();
    let n = time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| DynamoError::MalformedMessage("timed out waiting for request".to_string()))??;
    if n == 0 {
        return Ok(());
    }
    if !line.ends_with('\n') {
        return Err(DynamoError::MalformedMessage(format!(
            "request not terminated within {max_bytes} bytes"
        )));
    }

    // undecodable requests get no reply; the sender treats that as a failure
    let message = Message::decode(&line)?;
    debug!(?message, "server received message");

    if let Some(reply) = node.handle_message(message)? {
        let mut encoded = reply.encode()?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Outbound side of the one-request-per-connection protocol. Any connect,
/// I/O, timeout, or decode failure is reported as an error for that peer.
#[derive(Debug, Clone, Copy)]
pub struct NetworkClient {
    timeout: Duration,
    max_bytes: u64,
}

impl NetworkClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Replies longer than `max_bytes` are treated as a peer failure.
    pub fn with_max_message_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn send(&self, address: SocketAddr, message: &Message) -> Result<Message, DynamoError> {
        match time::timeout(self.timeout, exchange(address, message, self.max_bytes)).await {
            Ok(result) => result,
            Err(_) => Err(DynamoError::PeerUnreachable {
                addr: address,
                reason: format!("no reply within {:?}", self.timeout),
            }),
        }
    }
}

async fn exchange(address: SocketAddr, message: &Message, max_bytes: u64) -> Result<Message, DynamoError> {
    let unreachable = |e: std::io::Error| DynamoError::PeerUnreachable {
        addr: address,
        reason: e.to_string(),
    };

    let stream = TcpStream::connect(address).await.map_err(unreachable)?;
    let (reader, mut writer) = stream.into_split();

    let mut encoded = message.encode()?;
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await.map_err(unreachable)?;
    writer.flush().await.map_err(unreachable)?;

    let mut reader = BufReader::new(reader.take(max_bytes));
    let mut reply = String::new();
    reader.read_line(&mut reply).await.map_err(unreachable)?;
    if !reply.ends_with('\n') {
        return Err(DynamoError::PeerUnreachable {
            addr: address,
            reason: format!("no complete reply within {max_bytes} bytes"),
        });
    }

    Message::decode(&reply)
}

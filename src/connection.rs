//! # Connection Layer
//!
//! Wraps one TCP connection between peers with the line-framed protocol
//! from [`crate::proto`] and the startup handshake both sides run before
//! any control commands are exchanged.

use crate::error::{NstsError, ProtocolError};
use crate::proto::{self, Message, Params};
use crate::value::Value;
use std::net::SocketAddr;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Current wire protocol version. Bumped whenever the framing or command
/// set changes in an incompatible way.
pub const PROTOCOL_VERSION: u32 = 0;

/// Which side of the handshake this connection is performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Client,
    Server,
}

/// One live connection to a peer, framed with the line-delimited control
/// protocol.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    ipv6: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        let remote_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let ipv6 = remote_addr.is_ipv6();
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            remote_addr,
            local_addr,
            ipv6,
        })
    }

    pub fn is_ipv6(&self) -> bool {
        self.ipv6
    }

    pub async fn send_msg(&mut self, msg: &Message) -> Result<(), NstsError> {
        proto::write_message(&mut self.writer, msg).await
    }

    pub async fn wait_msg(&mut self) -> Result<Message, NstsError> {
        proto::read_message(&mut self.reader).await
    }

    pub async fn wait_msg_type(&mut self, expected: &str) -> Result<Message, NstsError> {
        let msg = self.wait_msg().await?;
        if msg.type_ != expected {
            return Err(ProtocolError::UnexpectedType {
                expected: expected.to_string(),
                got: msg.type_,
            }
            .into());
        }
        Ok(msg)
    }

    /// Best-effort send used once the connection is already known to be in
    /// a broken or finishing state: failures are logged and swallowed
    /// rather than propagated.
    pub async fn send_best_effort(&mut self, msg: &Message) {
        if let Err(e) = self.send_msg(msg).await {
            tracing::warn!("best-effort send of '{}' failed: {}", msg.type_, e);
        }
    }

    /// Run this side's half of the startup handshake: both peers send a
    /// `HELLO{version, remote_addr}` message first, then each waits for the
    /// peer's `HELLO` and verifies its protocol version matches its own,
    /// adopting the peer's self-reported view of where it sees us
    /// connecting from — the address our own socket reports for itself can
    /// be wrong behind NAT or port forwarding, while the peer's view of who
    /// just connected to it is authoritative. Sending before waiting on
    /// both sides means a version mismatch is raised as a `ProtocolError`
    /// on both peers, never an `EOF`-flavored `ConnectionClosed` on
    /// whichever side happened to wait first.
    pub async fn handshake(&mut self, role: ConnectionRole) -> Result<(), NstsError> {
        let mut hello_params = Params::new();
        hello_params.insert("version".to_string(), Value::Int(PROTOCOL_VERSION as i64));
        hello_params.insert(
            "remote_addr".to_string(),
            Value::from(self.remote_addr.to_string()),
        );
        let hello = Message::with_params("HELLO", hello_params);

        match role {
            ConnectionRole::Client => {
                self.send_msg(&hello).await?;
                let reply = self.wait_msg_type("HELLO").await?;
                self.verify_peer_version(&reply)?;
                self.adopt_peer_reported_local_addr(&reply);
            }
            ConnectionRole::Server => {
                self.send_msg(&hello).await?;
                let incoming = self.wait_msg_type("HELLO").await?;
                self.verify_peer_version(&incoming)?;
                self.adopt_peer_reported_local_addr(&incoming);
            }
        }
        debug!(
            remote = %self.remote_addr,
            local = %self.local_addr,
            "handshake complete, protocol version {}",
            PROTOCOL_VERSION
        );
        Ok(())
    }

    fn verify_peer_version(&self, msg: &Message) -> Result<(), NstsError> {
        let remote = msg
            .param("version")
            .and_then(Value::as_int)
            .ok_or_else(|| ProtocolError::Malformed("HELLO missing version".to_string()))?
            as u32;
        if remote != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote,
            }
            .into());
        }
        Ok(())
    }

    /// Replaces the locally-derived `local_addr` with the peer's
    /// self-reported `remote_addr`, if present and parseable. Falls back to
    /// the local socket's own view otherwise.
    fn adopt_peer_reported_local_addr(&mut self, msg: &Message) {
        if let Some(addr) = msg
            .param("remote_addr")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<SocketAddr>().ok())
        {
            self.local_addr = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client_res, server_res) = tokio::join!(
            TcpStream::connect(addr),
            async { listener.accept().await.map(|(s, _)| s) }
        );
        (
            Connection::new(client_res.unwrap()).unwrap(),
            Connection::new(server_res.unwrap()).unwrap(),
        )
    }

    #[tokio::test]
    async fn handshake_succeeds_with_matching_versions() {
        let (mut client, mut server) = connected_pair().await;
        let (client_res, server_res) = tokio::join!(
            client.handshake(ConnectionRole::Client),
            server.handshake(ConnectionRole::Server),
        );
        client_res.unwrap();
        server_res.unwrap();
    }

    #[tokio::test]
    async fn mismatched_version_is_rejected() {
        let (mut client, mut server) = connected_pair().await;
        let server_task = tokio::spawn(async move {
            let mut params = Params::new();
            params.insert("version".to_string(), Value::Int(999));
            let hello = Message::with_params("HELLO", params);
            let incoming = server.wait_msg_type("HELLO").await.unwrap();
            assert_eq!(incoming.type_, "HELLO");
            server.send_msg(&hello).await.unwrap();
        });
        let client_result = client.handshake(ConnectionRole::Client).await;
        server_task.await.unwrap();
        assert!(matches!(
            client_result,
            Err(NstsError::Protocol(ProtocolError::VersionMismatch { .. }))
        ));
    }
}

//! # Server Engine
//!
//! Serves clients serially in one task: accept a connection, run the
//! handshake, then dispatch `CHECKPROFILE`/`INSTANTIATEPROFILE` control
//! commands until the peer disconnects, and go back to accepting.
//! Grounded on the original's `server.py` (`NSTSServer`), with the
//! per-connection try/except replaced by matching on
//! [`crate::error::NstsError::ConnectionClosed`] to decide whether to log
//! and resume versus propagate.

use crate::connection::{Connection, ConnectionRole};
use crate::error::{NstsError, ProfileRuntimeError, ProtocolError};
use crate::profiles::{self, ExecutionDirection, ProfileExecution};
use crate::proto::{Message, Params};
use crate::value::Value;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Runs the server loop forever: bind, then repeatedly accept and serve
/// one client at a time. Each connection's errors are isolated — a
/// misbehaving or disconnecting client never takes the server down.
pub async fn serve(host: &str, port: u16, ipv6: bool) -> anyhow::Result<()> {
    let listener = bind_reuseaddr(host, port, ipv6)?;
    info!("server listening on {}:{} (ipv6={})", host, port, ipv6);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("accepted connection from {}", peer);
        if let Err(e) = serve_connection(stream, ipv6).await {
            match e {
                NstsError::ConnectionClosed(_) => info!("client {} disconnected", peer),
                other => warn!("client {} raised an error: {}", peer, other),
            }
        }
    }
}

fn bind_reuseaddr(host: &str, port: u16, ipv6: bool) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = if ipv6 {
        format!("[{host}]:{port}").parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], port)))
    } else {
        format!("{host}:{port}").parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
    };
    let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Run the handshake and control-command dispatch loop for one already-
/// accepted connection, until the peer disconnects or a protocol error
/// occurs. Exposed so a test (or an embedder running its own listener)
/// can drive a single connection without going through [`serve`]'s
/// infinite accept loop.
pub async fn serve_connection(stream: TcpStream, ipv6: bool) -> Result<(), NstsError> {
    let mut conn = Connection::new(stream)?;
    conn.handshake(ConnectionRole::Server).await?;
    let conn = Arc::new(Mutex::new(conn));

    loop {
        let msg = conn.lock().await.wait_msg().await?;
        match msg.type_.as_str() {
            "CHECKPROFILE" => serve_checkprofile(&conn, &msg).await?,
            "INSTANTIATEPROFILE" => serve_instantiate(&conn, &msg, ipv6).await?,
            other => {
                warn!("ignoring unknown control message '{}'", other);
            }
        }
    }
}

async fn serve_checkprofile(conn: &Arc<Mutex<Connection>>, msg: &Message) -> Result<(), NstsError> {
    let profile_id = msg
        .param("profile_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("CHECKPROFILE missing profile_id".to_string()))?;
    let installed = profiles::is_registered(profile_id);

    let mut params = Params::new();
    params.insert("profile_id".to_string(), Value::from(profile_id.to_string()));
    params.insert("installed".to_string(), Value::Bool(installed));
    params.insert("supported".to_string(), Value::Bool(installed));
    conn.lock()
        .await
        .send_msg(&Message::with_params("PROFILEINFO", params))
        .await
}

async fn serve_instantiate(conn: &Arc<Mutex<Connection>>, msg: &Message, ipv6: bool) -> Result<(), NstsError> {
    let profile_id = msg
        .param("profile_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("INSTANTIATEPROFILE missing profile_id".to_string()))?;
    let direction_str = msg
        .param("direction")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("INSTANTIATEPROFILE missing direction".to_string()))?;
    let execution_id = msg
        .param("execution_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("INSTANTIATEPROFILE missing execution_id".to_string()))?
        .to_string();

    let profile = profiles::get_profile(profile_id)
        .ok_or_else(|| ProfileRuntimeError::UnknownProfile(profile_id.to_string()))?;
    let direction =
        ExecutionDirection::from_str(direction_str).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let mut options = profile.supported_options.instantiate();
    if let Some(Value::Map(values)) = msg.param("options") {
        for (k, v) in values {
            options
                .set_value(k, v.clone())
                .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        }
    }

    debug!("instantiating profile '{}' (execution {})", profile_id, execution_id);
    let mut execution = ProfileExecution::from_execution_id(profile, direction, conn.clone(), options, execution_id.clone(), ipv6);

    let run_result = async {
        execution.executor_mut().prepare().await?;
        conn.lock().await.send_msg(&Message::new("OK")).await?;
        execution.executor_mut().run().await
    }
    .await;

    if let Err(ref e) = run_result {
        execution.notify_peer_failure(e).await;
    }

    execution.mark_finished();
    execution.executor_mut().cleanup().await?;

    if let Err(e) = run_result {
        let mut failed = Params::new();
        failed.insert("execution_id".to_string(), Value::from(execution_id));
        failed.insert("error".to_string(), Value::from(e.to_string()));
        conn.lock()
            .await
            .send_best_effort(&Message::with_params("EXECUTIONFINISHED", failed))
            .await;
        return Err(e);
    }

    let mut finished = Params::new();
    finished.insert("execution_id".to_string(), Value::from(execution_id));
    conn.lock()
        .await
        .send_msg(&Message::with_params("EXECUTIONFINISHED", finished))
        .await?;
    conn.lock().await.wait_msg_type("EXECUTIONFINISHED").await?;
    Ok(())
}

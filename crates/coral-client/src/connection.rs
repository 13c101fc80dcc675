//! Async TCP connections to cluster nodes.
//!
//! [`Client`] is a cheap endpoint handle (address + timeouts) that dials
//! [`Connection`]s. A connection is a buffered request/response channel;
//! the topology manager uses them for `CLUSTER NODES` / `CLUSTER INFO`
//! probes, and entries use them for master traffic.
//!
//! A connection that sees an I/O error, a protocol error, or a timeout
//! marks itself inactive and rejects further requests; callers are
//! expected to drop it and dial a fresh one.

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use coral_cluster::{parse_cluster_info, NodeAddr};
use coral_protocol::{parse_frame, write_command, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ConnectionError;

/// Options applied when dialing a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub ping_timeout: Duration,
    pub password: Option<String>,
    pub database: u32,
    pub client_name: Option<String>,
}

/// An endpoint handle that can dial connections to one node.
#[derive(Debug, Clone)]
pub struct Client {
    addr: NodeAddr,
    opts: ConnectOptions,
}

impl Client {
    pub fn new(addr: NodeAddr, opts: ConnectOptions) -> Self {
        Self { addr, opts }
    }

    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Dials the node, applying the connect timeout and running the
    /// connection setup ritual (AUTH / SELECT / CLIENT SETNAME) as
    /// configured.
    pub async fn connect(&self) -> Result<Connection, ConnectionError> {
        let dial = TcpStream::connect((self.addr.host.as_str(), self.addr.port));
        let stream = timeout(self.opts.connect_timeout, dial)
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                addr: self.addr.clone(),
            })??;

        let mut conn = Connection {
            addr: self.addr.clone(),
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(512),
            command_timeout: self.opts.command_timeout,
            ping_timeout: self.opts.ping_timeout,
            active: true,
        };

        if let Some(password) = &self.opts.password {
            conn.request(&["AUTH", password.as_str()]).await?;
        }
        if self.opts.database != 0 {
            let db = self.opts.database.to_string();
            conn.request(&["SELECT", db.as_str()]).await?;
        }
        if let Some(name) = &self.opts.client_name {
            conn.request(&["CLIENT", "SETNAME", name.as_str()]).await?;
        }

        debug!("connected to {}", self.addr);
        Ok(conn)
    }
}

/// A buffered request/response connection to one node.
pub struct Connection {
    addr: NodeAddr,
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    command_timeout: Duration,
    ping_timeout: Duration,
    active: bool,
}

impl Connection {
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Whether this connection can still carry requests. Once false it
    /// stays false.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sends one command and reads one reply, applying the command timeout.
    ///
    /// An error reply from the server surfaces as
    /// [`ConnectionError::Server`] and leaves the connection usable;
    /// transport-level failures deactivate it.
    pub async fn request(&mut self, tokens: &[&str]) -> Result<Frame, ConnectionError> {
        let limit = self.command_timeout;
        self.request_with_timeout(tokens, limit).await
    }

    async fn request_with_timeout(
        &mut self,
        tokens: &[&str],
        limit: Duration,
    ) -> Result<Frame, ConnectionError> {
        if !self.active {
            return Err(ConnectionError::Inactive);
        }

        match timeout(limit, self.exchange(tokens)).await {
            Ok(Ok(Frame::Error(message))) => Err(ConnectionError::Server(message)),
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(err)) => {
                self.active = false;
                Err(err)
            }
            Err(_) => {
                self.active = false;
                Err(ConnectionError::CommandTimeout)
            }
        }
    }

    async fn exchange(&mut self, tokens: &[&str]) -> Result<Frame, ConnectionError> {
        self.write_buf.clear();
        write_command(&mut self.write_buf, tokens);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        loop {
            if !self.read_buf.is_empty() {
                if let Some((frame, consumed)) = parse_frame(&self.read_buf)? {
                    let _ = self.read_buf.split_to(consumed);
                    return Ok(frame);
                }
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ConnectionError::Disconnected);
            }
        }
    }

    /// Fetches the raw `CLUSTER NODES` listing.
    pub async fn cluster_nodes(&mut self) -> Result<String, ConnectionError> {
        let frame = self.request(&["CLUSTER", "NODES"]).await?;
        frame
            .as_text()
            .map(str::to_owned)
            .ok_or(ConnectionError::UnexpectedReply("CLUSTER NODES"))
    }

    /// Fetches and parses the `CLUSTER INFO` body.
    pub async fn cluster_info(&mut self) -> Result<HashMap<String, String>, ConnectionError> {
        let frame = self.request(&["CLUSTER", "INFO"]).await?;
        let text = frame
            .as_text()
            .ok_or(ConnectionError::UnexpectedReply("CLUSTER INFO"))?;
        Ok(parse_cluster_info(text))
    }

    /// Round-trips a PING under the (shorter) ping timeout.
    pub async fn ping(&mut self) -> Result<(), ConnectionError> {
        let limit = self.ping_timeout;
        let frame = self.request_with_timeout(&["PING"], limit).await?;
        match frame.as_text() {
            Some("PONG") => Ok(()),
            _ => Err(ConnectionError::UnexpectedReply("PING")),
        }
    }

    /// Consumes the connection and shuts the socket down in the background.
    pub fn close_async(mut self) {
        self.active = false;
        tokio::spawn(async move {
            let _ = self.stream.shutdown().await;
        });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

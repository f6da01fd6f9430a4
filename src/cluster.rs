//! Telnet connection to a DX cluster.
//!
//! This module handles the TCP connection to the cluster server. Reading
//! and writing are split so that the line reader and the operator console
//! can run as independent tasks.

use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

/// Configuration for the cluster connection.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Server address as `host:port`.
    pub server: String,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl ClusterConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// An open cluster connection, split into its two directions.
pub struct ClusterConnection {
    pub reader: ClusterReader,
    pub writer: ClusterWriter,
}

impl ClusterConnection {
    /// Connect to the cluster server.
    pub async fn connect(config: &ClusterConfig) -> Result<Self> {
        info!("Connecting to {}...", config.server);

        let stream = timeout(config.connect_timeout, TcpStream::connect(&config.server))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", config.server))?;

        info!("Connected to {}", config.server);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: ClusterReader {
                inner: BufReader::new(reader),
                buf: Vec::with_capacity(256),
            },
            writer: ClusterWriter {
                inner: Arc::new(Mutex::new(writer)),
            },
        }
    }
}

/// Line reader for the cluster feed.
pub struct ClusterReader {
    inner: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
}

impl ClusterReader {
    /// Read the next line without its line ending.
    ///
    /// Returns `Ok(None)` at end of stream. Bytes that are not valid UTF-8
    /// are replaced rather than rejected; clusters are not careful about
    /// encodings.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        debug!("Received: {}", line);
        Ok(Some(line))
    }
}

/// Shared writer for the cluster connection.
#[derive(Clone)]
pub struct ClusterWriter {
    inner: Arc<Mutex<OwnedWriteHalf>>,
}

impl ClusterWriter {
    /// Send one line, terminated with CRLF.
    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        debug!("Sending: {}", line);
        let mut writer = self.inner.lock().await;
        writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
        writer.flush().await
    }

    /// Close our side of the connection.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

//! TCP client for the SmartSDR command API.
//!
//! Commands go out as `C<seq>|<command>` lines and the radio answers each
//! with `R<seq>|<hex error>|<message>`. Interleaved with responses the radio
//! sends version (`V`), handle (`H`), status (`S`) and message (`M`) lines.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{CmdResult, RADIO_PORT, Radio, RadioError, discovery, sanitize};
use crate::shutdown::wait_for_flag;

/// Prefix of a radio target that asks for discovery instead of an address.
pub const DISCOVER_PREFIX: &str = ":discover:";

type Pending = HashMap<u32, oneshot::Sender<CmdResult>>;

/// Connected SmartSDR client.
pub struct FlexClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    pending: Mutex<Pending>,
    next_seq: AtomicU32,
    closed: watch::Sender<bool>,
}

impl FlexClient {
    /// Resolve a radio target, connect, and announce the station name.
    ///
    /// The target is either `host`, `host:port`, or `:discover:` optionally
    /// followed by `key=value` pairs the discovered radio must match.
    pub async fn dial(target: &str, station: &str, connect_timeout: Duration) -> Result<Self> {
        let addr = match target.strip_prefix(DISCOVER_PREFIX) {
            Some(filter) => {
                let radio = discovery::discover(filter, connect_timeout).await?;
                info!("Discovered {}", radio);
                radio.address()
            }
            None => with_default_port(target),
        };

        let client = Self::connect(&addr, connect_timeout).await?;
        client
            .send(&format!("client station {}", sanitize(station)))
            .await
            .context("Failed to send station name")?;
        Ok(client)
    }

    /// Connect to the radio at `addr`.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        info!("Connecting to radio at {}...", addr);

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .context("Radio connection timeout")?
            .with_context(|| format!("Failed to connect to radio at {}", addr))?;

        info!("Connected to radio at {}", addr);

        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            reader: Mutex::new(Some(BufReader::new(reader))),
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU32::new(1),
            closed,
        })
    }

    /// Send a command without waiting for its response.
    pub async fn send(&self, command: &str) -> Result<u32, RadioError> {
        let seq = self.next_seq.fetch_add(1, Relaxed);
        self.write_command(seq, command).await?;
        Ok(seq)
    }

    async fn write_command(&self, seq: u32, command: &str) -> Result<(), RadioError> {
        debug!("Radio <- C{}|{}", seq, command);
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("C{}|{}\n", seq, command).as_bytes())
            .await?;
        writer.flush().await?;
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn handle_line(&self, line: &str) {
        match line.chars().next() {
            Some('R') => match parse_response(line) {
                Ok((seq, result)) => {
                    let waiter = self.lock_pending().remove(&seq);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(result);
                        }
                        None => debug!("Unsolicited response for C{}: {:?}", seq, result),
                    }
                }
                Err(e) => warn!("{}", e),
            },
            Some('V') => info!("Radio protocol version {}", &line[1..]),
            Some('H') => info!("Radio assigned client handle {}", &line[1..]),
            Some('M') => info!("Radio message: {}", &line[1..]),
            Some('S') => {}
            _ => debug!("Unrecognized radio line: {}", line),
        }
    }
}

impl Radio for FlexClient {
    async fn send_and_wait(&self, command: String) -> Result<CmdResult, RadioError> {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Relaxed);
        self.lock_pending().insert(seq, tx);

        // The drive loop sets the flag before draining waiters, so a waiter
        // inserted before this check is either drained or answered.
        if self.is_closed() {
            self.lock_pending().remove(&seq);
            return Err(RadioError::Closed);
        }

        if let Err(e) = self.write_command(seq, &command).await {
            self.lock_pending().remove(&seq);
            return Err(e);
        }

        rx.await.map_err(|_| RadioError::Closed)
    }

    async fn run(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut reader) = reader else {
            warn!("Radio drive loop is already running");
            return;
        };

        let mut closed = self.closed.subscribe();
        let mut line_buf = String::with_capacity(256);

        loop {
            line_buf.clear();

            tokio::select! {
                _ = wait_for_flag(&mut closed) => {
                    debug!("Radio client closed");
                    break;
                }
                read = reader.read_line(&mut line_buf) => match read {
                    Ok(0) => {
                        info!("Radio closed the connection");
                        break;
                    }
                    Ok(_) => self.handle_line(line_buf.trim_end()),
                    Err(e) => {
                        error!("Radio read error: {}", e);
                        break;
                    }
                },
            }
        }

        self.closed.send_replace(true);
        self.lock_pending().clear();
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Append the default API port when `target` has none.
fn with_default_port(target: &str) -> String {
    if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:{}", target, RADIO_PORT)
    }
}

/// Parse an `R<seq>|<hex error>|<message>[|<debug>]` response line.
fn parse_response(line: &str) -> Result<(u32, CmdResult), RadioError> {
    let malformed = || RadioError::MalformedResponse(line.to_string());

    let body = line.strip_prefix('R').ok_or_else(malformed)?;
    let mut parts = body.splitn(4, '|');
    let seq = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let error = parts
        .next()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(malformed)?;
    let message = parts.next().unwrap_or("").to_string();

    Ok((seq, CmdResult { error, message }))
}

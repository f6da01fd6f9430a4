//! Radio side of the bridge.
//!
//! The rest of the crate talks to the radio only through the [`Radio`]
//! trait: a request/response call plus a drive loop that has to be polled
//! concurrently for responses to arrive. [`flex::FlexClient`] is the TCP
//! implementation used by the binary.

pub mod discovery;
pub mod flex;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::spot::SpotEvent;

pub use flex::FlexClient;

/// Error code the radio returns when a spot id is unknown to it.
pub const SPOT_NOT_FOUND: u32 = 0x500000BC;

/// Default TCP port of the radio's command API.
pub const RADIO_PORT: u16 = 4992;

/// Character substituted for spaces in command arguments.
pub const SPACE_PLACEHOLDER: char = '\x7f';

/// Response to a radio command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdResult {
    /// Zero on success.
    pub error: u32,

    /// Response body; for `spot add` this is the new spot id.
    pub message: String,
}

impl CmdResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: 0,
            message: message.into(),
        }
    }

    pub fn err(error: u32, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    pub fn is_not_found(&self) -> bool {
        self.error == SPOT_NOT_FOUND
    }
}

/// Errors that prevent a command from getting a response at all.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Radio connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A connected radio.
///
/// `run` must be driven concurrently with any `send_and_wait` calls, and
/// returns once the connection ends or `close` is called. After that every
/// pending and future `send_and_wait` fails with [`RadioError::Closed`].
pub trait Radio: Send + Sync + 'static {
    /// Send a command and wait for its response.
    fn send_and_wait(
        &self,
        command: String,
    ) -> impl Future<Output = Result<CmdResult, RadioError>> + Send;

    /// Drive the connection until it ends.
    fn run(&self) -> impl Future<Output = ()> + Send;

    /// Ask the drive loop to stop. Idempotent.
    fn close(&self);
}

/// Replace spaces so a value survives the space-delimited command grammar.
pub fn sanitize(value: &str) -> String {
    value.replace(' ', &SPACE_PLACEHOLDER.to_string())
}

/// The `key=value` argument list shared by `spot add` and `spot set`.
///
/// Every interpolated value is sanitized.
pub fn spot_fields(spot: &SpotEvent, lifetime: Duration) -> String {
    format!(
        "rx_freq={:.6} callsign={} spotter_callsign={} comment={} lifetime_seconds={}",
        spot.frequency_mhz(),
        sanitize(&spot.dx_call),
        sanitize(&spot.spotter),
        sanitize(&spot.comment),
        lifetime.as_secs()
    )
}

pub fn spot_add_command(spot: &SpotEvent, lifetime: Duration) -> String {
    format!("spot add {}", spot_fields(spot, lifetime))
}

pub fn spot_set_command(id: u32, spot: &SpotEvent, lifetime: Duration) -> String {
    format!("spot set {} {}", id, spot_fields(spot, lifetime))
}

pub fn spot_remove_command(id: u32) -> String {
    format!("spot remove {}", id)
}


#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory radio for registry and pipeline tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
    use tokio::sync::watch;

    use crate::shutdown::wait_for_flag;

    pub struct MockRadio {
        commands: Mutex<Vec<String>>,
        scripted: Mutex<VecDeque<Result<CmdResult, RadioError>>>,
        next_id: AtomicU32,
        closed: watch::Sender<bool>,
    }

    impl MockRadio {
        /// A radio that accepts everything, handing out ids from 100 up.
        pub fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                scripted: Mutex::new(VecDeque::new()),
                next_id: AtomicU32::new(100),
                closed: watch::channel(false).0,
            }
        }

        /// Queue a response for the next command instead of the default.
        pub fn script(&self, response: Result<CmdResult, RadioError>) {
            self.scripted.lock().unwrap().push_back(response);
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.borrow()
        }
    }

    impl Radio for MockRadio {
        async fn send_and_wait(&self, command: String) -> Result<CmdResult, RadioError> {
            self.commands.lock().unwrap().push(command.clone());
            if let Some(response) = self.scripted.lock().unwrap().pop_front() {
                return response;
            }
            if command.starts_with("spot add") {
                Ok(CmdResult::ok(self.next_id.fetch_add(1, Relaxed).to_string()))
            } else {
                Ok(CmdResult::ok(""))
            }
        }

        async fn run(&self) {
            let mut closed = self.closed.subscribe();
            wait_for_flag(&mut closed).await;
        }

        fn close(&self) {
            self.closed.send_replace(true);
        }
    }
}

//! Spot registry: which cluster spots currently have a spot on the radio.
//!
//! The registry maps a [`SpotKey`] to the id the radio assigned when the
//! spot was created, so that repeated announcements of the same station
//! refresh one radio spot instead of stacking duplicates. It is the only
//! place that issues spot commands, and it is owned by the single task that
//! processes cluster lines; cluster lines therefore reach it strictly in
//! arrival order.
//!
//! Failed commands are logged and abandoned. The cluster re-announces
//! active stations, which repairs whatever a failure left behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::radio::{
    CmdResult, Radio, RadioError, spot_add_command, spot_remove_command, spot_set_command,
};
use crate::spot::SpotEvent;
use crate::stats::BridgeStats;

/// Deduplication unit: one radio spot per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotKey {
    /// Band label, or frequency rounded to the nearest kHz.
    pub scope: String,
    pub dx_call: String,
}

/// A spot that exists on the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedSpot {
    pub remote_id: u32,
    pub expires_at: Instant,
}

/// Registry behavior switches.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Spot lifetime on the radio and in the registry.
    pub lifetime: Duration,

    /// Key spots by band instead of by frequency.
    pub one_per_band: bool,

    /// Remove the spot when its comment says QRT.
    pub qrt_removes: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(300),
            one_per_band: true,
            qrt_removes: true,
        }
    }
}

enum UpdateOutcome {
    Updated,
    NotFound,
    Failed,
}

/// The dedup and lifecycle engine.
pub struct SpotRegistry<R> {
    radio: Arc<R>,
    settings: RegistrySettings,
    spots: HashMap<SpotKey, TrackedSpot>,
    stats: Arc<BridgeStats>,
}

impl<R: Radio> SpotRegistry<R> {
    pub fn new(radio: Arc<R>, settings: RegistrySettings, stats: Arc<BridgeStats>) -> Self {
        Self {
            radio,
            settings,
            spots: HashMap::new(),
            stats,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Compute the key a spot is deduplicated under.
    pub fn key_for(&self, spot: &SpotEvent) -> SpotKey {
        let scope = if self.settings.one_per_band {
            spot.band().to_string()
        } else {
            // Ties round to even.
            format!("{:.0}", spot.frequency_khz)
        };
        SpotKey {
            scope,
            dx_call: spot.dx_call.clone(),
        }
    }

    /// Whether this spot asks for its radio spot to be removed.
    pub fn is_removal(&self, spot: &SpotEvent) -> bool {
        self.settings.qrt_removes && spot.qrt
    }

    pub fn get(&self, key: &SpotKey) -> Option<&TrackedSpot> {
        self.spots.get(key)
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Create, refresh, or remove the radio spot for a cluster spot.
    pub async fn upsert(&mut self, spot: &SpotEvent) {
        let key = self.key_for(spot);

        if self.is_removal(spot) {
            self.remove(&key).await;
            return;
        }

        let existing = self.spots.get(&key).copied();
        let remote_id = match existing {
            Some(tracked) => match self.update(tracked.remote_id, spot).await {
                UpdateOutcome::Updated => Some(tracked.remote_id),
                UpdateOutcome::NotFound => {
                    debug!(
                        "Radio no longer has spot {} for {:?}, adding again",
                        tracked.remote_id, key
                    );
                    BridgeStats::record(&self.stats.fallbacks);
                    // The radio has confirmed the old id is dead.
                    self.spots.remove(&key);
                    self.add(spot).await
                }
                UpdateOutcome::Failed => return,
            },
            None => self.add(spot).await,
        };

        if let Some(remote_id) = remote_id {
            let expires_at = Instant::now() + self.settings.lifetime;
            self.spots.insert(
                key,
                TrackedSpot {
                    remote_id,
                    expires_at,
                },
            );
        }
    }

    /// Forget `key` and remove its radio spot.
    ///
    /// The entry is dropped even if the radio rejects the removal, so the
    /// registry never holds ids the radio may have discarded.
    pub async fn remove(&mut self, key: &SpotKey) {
        let Some(tracked) = self.spots.remove(key) else {
            debug!("No radio spot to remove for {:?}", key);
            return;
        };

        BridgeStats::record(&self.stats.removals);
        match self.call(spot_remove_command(tracked.remote_id)).await {
            Ok(res) if res.is_ok() || res.is_not_found() => {
                debug!("Removed spot {} for {:?}", tracked.remote_id, key);
            }
            Ok(res) => self.log_failure("remove", &key.dx_call, &res),
            Err(e) => self.log_error("remove", &key.dx_call, &e),
        }
    }

    /// Drop every entry that expired at or before `now`.
    ///
    /// The radio expires its copy of each spot on the same lifetime, so no
    /// command is sent. Returns the number of entries dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.spots.len();
        self.spots.retain(|_, tracked| tracked.expires_at > now);
        let expired = before - self.spots.len();

        if expired > 0 {
            debug!("Expired {} spot(s)", expired);
            BridgeStats::record_many(&self.stats.expired, expired as u64);
        }
        expired
    }

    async fn add(&self, spot: &SpotEvent) -> Option<u32> {
        let res = match self
            .call(spot_add_command(spot, self.settings.lifetime))
            .await
        {
            Ok(res) => res,
            Err(e) => {
                self.log_error("add", &spot.dx_call, &e);
                return None;
            }
        };

        if !res.is_ok() {
            self.log_failure("add", &spot.dx_call, &res);
            return None;
        }

        match res.message.trim().parse::<u32>() {
            Ok(id) => {
                BridgeStats::record(&self.stats.adds);
                Some(id)
            }
            Err(_) => {
                error!(
                    "Radio returned unusable spot id '{}' for {}",
                    res.message, spot.dx_call
                );
                BridgeStats::record(&self.stats.rpc_failures);
                None
            }
        }
    }

    async fn update(&self, remote_id: u32, spot: &SpotEvent) -> UpdateOutcome {
        match self
            .call(spot_set_command(remote_id, spot, self.settings.lifetime))
            .await
        {
            Ok(res) if res.is_ok() => {
                BridgeStats::record(&self.stats.updates);
                UpdateOutcome::Updated
            }
            Ok(res) if res.is_not_found() => UpdateOutcome::NotFound,
            Ok(res) => {
                self.log_failure("set", &spot.dx_call, &res);
                UpdateOutcome::Failed
            }
            Err(e) => {
                self.log_error("set", &spot.dx_call, &e);
                UpdateOutcome::Failed
            }
        }
    }

    async fn call(&self, command: String) -> Result<CmdResult, RadioError> {
        let started = Instant::now();
        let res = self.radio.send_and_wait(command).await;
        self.stats.record_rpc_latency(started.elapsed());
        res
    }

    fn log_failure(&self, op: &str, dx_call: &str, res: &CmdResult) {
        BridgeStats::record(&self.stats.rpc_failures);
        error!(
            "spot {} for {} failed: error {:#010x} {}",
            op, dx_call, res.error, res.message
        );
    }

    fn log_error(&self, op: &str, dx_call: &str, e: &RadioError) {
        BridgeStats::record(&self.stats.rpc_failures);
        warn!("spot {} for {} not sent: {}", op, dx_call, e);
    }
}

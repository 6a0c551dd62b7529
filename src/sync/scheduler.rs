// Gossip Round Scheduler - The heartbeat of membership dissemination
//
// Each tick spawns an independent round:
// 1. Refresh our own record
// 2. Pick one random seed (no seeds = the round fails) and, if we know any
//    other peer, one random known peer
// 3. Run a SYN/ACK exchange with each target
//
// Rounds may overlap when one outlives the tick interval.

use super::exchange::{ExchangeReport, GossipError, GossipTarget, SyncEngine};
use super::refresh::SelfRefresher;
use crate::membership::{select_one, PeerRegistry, PeerSelector};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout, Duration, MissedTickBehavior};

/// What a failed exchange does to the rest of its round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// The first failed exchange fails the whole round
    #[default]
    AbortRound,
    /// Failed exchanges are recorded and the remaining targets still run
    IsolateTargets,
}

/// Configuration for the gossip scheduler
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Tick interval in milliseconds
    pub interval_ms: u64,
    /// Upper bound for one whole round in milliseconds
    pub round_timeout_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            round_timeout_ms: 10_000,
            failure_policy: FailurePolicy::AbortRound,
        }
    }
}

impl GossipConfig {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms;
        self
    }

    pub fn with_round_timeout_ms(mut self, ms: u64) -> Self {
        self.round_timeout_ms = ms;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

/// Outcome of one round
#[derive(Debug, Default)]
pub struct RoundReport {
    pub targets: Vec<SocketAddr>,
    pub exchanges: Vec<ExchangeReport>,
    /// Only filled under `FailurePolicy::IsolateTargets`
    pub failures: Vec<GossipError>,
}

impl RoundReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Statistics about the scheduler
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub rounds_started: u64,
    pub rounds_completed: u64,
    pub rounds_failed: u64,
    pub exchanges_completed: u64,
}

#[derive(Default)]
struct StatCounters {
    rounds_started: AtomicU64,
    rounds_completed: AtomicU64,
    rounds_failed: AtomicU64,
    exchanges_completed: AtomicU64,
}

pub struct GossipScheduler {
    engine: Arc<SyncEngine>,
    refresher: Option<Arc<SelfRefresher>>,
    selector: Arc<dyn PeerSelector>,
    config: GossipConfig,
    stats: StatCounters,
}

impl GossipScheduler {
    pub fn new(engine: Arc<SyncEngine>, selector: Arc<dyn PeerSelector>, config: GossipConfig) -> Self {
        Self {
            engine,
            refresher: None,
            selector,
            config,
            stats: StatCounters::default(),
        }
    }

    /// Refresh the self record at the start of every round
    pub fn with_refresher(mut self, refresher: Arc<SelfRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    fn registry(&self) -> &PeerRegistry {
        self.engine.registry()
    }

    pub fn stats(&self) -> GossipStats {
        GossipStats {
            rounds_started: self.stats.rounds_started.load(Ordering::Relaxed),
            rounds_completed: self.stats.rounds_completed.load(Ordering::Relaxed),
            rounds_failed: self.stats.rounds_failed.load(Ordering::Relaxed),
            exchanges_completed: self.stats.exchanges_completed.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // TARGET SELECTION
    // ========================================================================

    /// One seed, plus one known non-self peer when there is any
    ///
    /// A seed listing our own address is only chosen when it is the only one.
    pub async fn select_targets(&self) -> Result<Vec<GossipTarget>, GossipError> {
        let mut seeds = self.registry().list_seeds().await;
        let own_address = *self.registry().owned_peer().await.address();
        if seeds.iter().any(|s| s.address() != &own_address) {
            seeds.retain(|s| s.address() != &own_address);
        }
        let seed = select_one(self.selector.as_ref(), &seeds).ok_or(GossipError::NoSeeds)?;
        let mut targets = vec![GossipTarget::seed(seed)];

        let known = self.registry().known_peers().await;
        if let Some(peer) = select_one(self.selector.as_ref(), &known) {
            targets.push(GossipTarget::peer(peer.clone()));
        }

        Ok(targets)
    }

    // ========================================================================
    // ROUNDS
    // ========================================================================

    /// Run one round without a deadline
    pub async fn run_round(&self) -> Result<RoundReport, GossipError> {
        if let Some(refresher) = &self.refresher {
            if let Err(e) = refresher.refresh().await {
                tracing::warn!(error = %e, "Self refresh failed, gossiping previous snapshot");
            }
        }

        let targets = self.select_targets().await?;
        let mut report = RoundReport {
            targets: targets.iter().map(|t| t.address).collect(),
            ..RoundReport::default()
        };

        for target in &targets {
            match self.engine.exchange(target).await {
                Ok(exchange) => {
                    self.stats.exchanges_completed.fetch_add(1, Ordering::Relaxed);
                    report.exchanges.push(exchange);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::AbortRound => return Err(e),
                    FailurePolicy::IsolateTargets => report.failures.push(e),
                },
            }
        }

        Ok(report)
    }

    /// Run one round bounded by the configured round timeout
    pub async fn run_round_with_deadline(&self) -> Result<RoundReport, GossipError> {
        let limit = self.config.round_timeout();
        timeout(limit, self.run_round())
            .await
            .map_err(|_| GossipError::RoundTimeout(limit))?
    }

    async fn fire(&self, mut shutdown: watch::Receiver<bool>) {
        self.stats.rounds_started.fetch_add(1, Ordering::Relaxed);

        let result = tokio::select! {
            result = self.run_round_with_deadline() => result,
            _ = shutdown.changed() => {
                tracing::debug!("Round cancelled by shutdown");
                return;
            }
        };

        match result {
            Ok(report) => {
                self.stats.rounds_completed.fetch_add(1, Ordering::Relaxed);
                for failure in &report.failures {
                    tracing::warn!(error = %failure, "Gossip target failed");
                }
                tracing::debug!(
                    targets = report.targets.len(),
                    exchanges = report.exchanges.len(),
                    failures = report.failures.len(),
                    "Gossip round complete"
                );
            }
            Err(e) => {
                self.stats.rounds_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Gossip round failed");
            }
        }
    }

    /// Tick until `shutdown` flips to true, spawning one task per round
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.config.interval_ms, "Gossip scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    let round_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        scheduler.fire(round_shutdown).await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Gossip scheduler stopped");
    }
}

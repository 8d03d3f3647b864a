//! Periodic waiting-pool scanner
//!
//! Runs a formation pass over every guild on a fixed interval. Passes are
//! blocking work, so each round runs on tokio's blocking pool.

use super::MatchingService;
use crate::error::{MatchError, MatchResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Counters for one or more scan rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub rounds: usize,
    pub guilds_scanned: usize,
    pub squads_formed: usize,
    pub users_placed: usize,
    /// Guilds skipped because another pass held the lease
    pub guilds_busy: usize,
    pub guilds_failed: usize,
}

impl ScanSummary {
    fn merge(&mut self, other: ScanSummary) {
        self.rounds += other.rounds;
        self.guilds_scanned += other.guilds_scanned;
        self.squads_formed += other.squads_formed;
        self.users_placed += other.users_placed;
        self.guilds_busy += other.guilds_busy;
        self.guilds_failed += other.guilds_failed;
    }
}

pub struct PoolScanner {
    service: Arc<MatchingService>,
    period: Duration,
}

impl PoolScanner {
    pub fn new(service: Arc<MatchingService>, period: Duration) -> Self {
        Self { service, period }
    }

    /// One pass over every guild.
    pub async fn scan_once(&self) -> MatchResult<ScanSummary> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || scan_all_guilds(&service))
            .await
            .map_err(|e| MatchError::TaskFailed {
                reason: e.to_string(),
            })?
    }

    /// Scan on every tick. Stops after `rounds` rounds when given, and
    /// otherwise runs until the task is dropped.
    pub async fn run(self, rounds: Option<usize>) -> ScanSummary {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Starting pool scanner with {} ms interval",
            self.period.as_millis()
        );

        let mut totals = ScanSummary::default();
        while rounds.is_none_or(|limit| totals.rounds < limit) {
            ticker.tick().await;
            match self.scan_once().await {
                Ok(round) => {
                    debug!(?round, "scan round finished");
                    totals.merge(round);
                }
                Err(e) => {
                    error!("Pool scan round failed: {e}");
                    totals.rounds += 1;
                }
            }
        }
        totals
    }

    /// Run forever in the background.
    pub fn spawn(self) -> JoinHandle<ScanSummary> {
        tokio::spawn(self.run(None))
    }
}

fn scan_all_guilds(service: &MatchingService) -> MatchResult<ScanSummary> {
    let mut summary = ScanSummary {
        rounds: 1,
        ..ScanSummary::default()
    };
    for guild in service.store().guilds()? {
        summary.guilds_scanned += 1;
        match service.notify_waiting_pool_matches(guild.id) {
            Ok(report) => {
                summary.squads_formed += report.formed_squads.len();
                summary.users_placed += report.notified_user_ids.len();
            }
            Err(MatchError::FormationInProgress { .. }) => summary.guilds_busy += 1,
            Err(e) => {
                warn!(guild = %guild.id, "pool scan failed: {e}");
                summary.guilds_failed += 1;
            }
        }
    }
    Ok(summary)
}

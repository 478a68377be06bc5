//! Full monitoring cycle: discovery pass, then concurrent checks.

use std::sync::Arc;

use futures::future;
use tracing::{error, info};

use crate::engine::discovery::{DiscoveryEngine, DiscoveryOutcome};
use crate::engine::fetch::ContentFetcher;
use crate::engine::monitor::{CheckOutcome, MonitorChecker};
use crate::error::{AppError, Result};
use crate::notify::Messenger;
use crate::store::RecordStore;

/// Tally of one full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Discovery tally, absent when the whole phase failed
    pub discovery: Option<DiscoveryOutcome>,
    /// Checks that completed, including skipped rows
    pub succeeded: usize,
    /// Checks that returned an error
    pub failed: usize,
}

/// Drives discovery and monitor checks against one record store.
pub struct Runner {
    store: Arc<dyn RecordStore>,
    checker: MonitorChecker,
    discovery: DiscoveryEngine,
}

impl Runner {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn RecordStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            checker: MonitorChecker::new(fetcher.clone(), store.clone(), messenger.clone()),
            discovery: DiscoveryEngine::new(fetcher, store.clone(), messenger),
            store,
        }
    }

    /// Run the discovery phase, then check every monitor row.
    ///
    /// Discovery failures never block the checks. Checks run concurrently
    /// and each failure is already persisted to its own row, so the cycle
    /// itself only fails when the rows cannot be listed.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let discovery = match self.discovery.run().await {
            Ok(outcome) => Some(outcome),
            Err(discovery_error) => {
                error!("Discovery phase failed: {discovery_error}");
                None
            }
        };

        let (succeeded, failed) = self.check_all().await?;

        Ok(CycleOutcome {
            discovery,
            succeeded,
            failed,
        })
    }

    /// Check every monitor row concurrently, without a discovery pass.
    /// Returns the (succeeded, failed) tally.
    pub async fn check_all(&self) -> Result<(usize, usize)> {
        let monitors = self.store.list_monitors().await?;
        let checks = monitors.iter().map(|target| self.checker.check(target));
        let results = future::join_all(checks).await;

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        let failed = results.len() - succeeded;
        info!("Check complete. Success: {succeeded}, Failed: {failed}");
        Ok((succeeded, failed))
    }

    /// Run only the discovery phase.
    pub async fn run_discovery(&self) -> Result<DiscoveryOutcome> {
        self.discovery.run().await
    }

    /// Check a single monitor row by record id.
    pub async fn check_one(&self, id: &str) -> Result<CheckOutcome> {
        let target = self
            .store
            .get_monitor(id)
            .await?
            .ok_or_else(|| AppError::validation(format!("No monitor record with id {id}")))?;
        self.checker.check(&target).await
    }
}

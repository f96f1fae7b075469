//! Pull → reconcile → apply → push orchestration.
//!
//! # Invariants
//! - Each bridge call is bounded by the caller's deadline.
//! - A failed pull leaves local notes untouched.
//! - Adopted notes are imported verbatim so their `updated_at` survives,
//!   and only while they are still newer than the stored copy.

use crate::repo::note_repo::{NoteRepository, RepoResult};
use crate::service::note_service::{on_blocking_pool, NoteService};
use crate::sync::bridge::{SyncBridge, SyncError, SyncResult, SyncStage};
use crate::sync::reconcile::reconcile;
use log::{error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters describing one completed sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pulled: usize,
    pub adopted: usize,
    pub kept_local: usize,
    pub local_only: usize,
    pub pushed: usize,
}

/// Runs sync passes between the local repository and one bridge.
pub struct SyncCoordinator<R: NoteRepository + 'static> {
    service: Arc<NoteService<R>>,
    bridge: Arc<dyn SyncBridge>,
}

impl<R: NoteRepository + 'static> SyncCoordinator<R> {
    pub fn new(service: Arc<NoteService<R>>, bridge: Arc<dyn SyncBridge>) -> Self {
        Self { service, bridge }
    }

    pub fn bridge_id(&self) -> &str {
        self.bridge.bridge_id()
    }

    /// Runs one full sync pass.
    ///
    /// # Errors
    /// - `Unavailable` when the bridge fails or a call exceeds `deadline`.
    /// - `Store` when local reads or adoption writes fail.
    pub async fn run(&self, deadline: Duration) -> SyncResult<SyncReport> {
        let started_at = Instant::now();
        let bridge_id = self.bridge.bridge_id();
        info!("event=sync_run module=sync status=start bridge={bridge_id}");

        match self.run_pass(deadline).await {
            Ok(report) => {
                info!(
                    "event=sync_run module=sync status=ok bridge={bridge_id} duration_ms={} pulled={} adopted={} pushed={}",
                    started_at.elapsed().as_millis(),
                    report.pulled,
                    report.adopted,
                    report.pushed
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=sync_run module=sync status=error bridge={bridge_id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    async fn run_pass(&self, deadline: Duration) -> SyncResult<SyncReport> {
        let remote = tokio::time::timeout(deadline, self.bridge.pull())
            .await
            .map_err(|_| SyncError::timed_out(SyncStage::Pull, deadline))??;
        let pulled = remote.len();

        let local = self.on_repo(|service| service.list_notes()).await?;
        let plan = reconcile(&local, remote);
        let planned = plan.adopt.len();

        // `import` re-checks `updated_at` against the stored row, so a local
        // write landing after the snapshot above still wins.
        let (merged, adopted) = if plan.is_noop() {
            (local, 0)
        } else {
            let adopt = plan.adopt;
            self.on_repo(move |service| {
                let mut adopted = 0;
                for note in &adopt {
                    if service.repository().import(note)? {
                        adopted += 1;
                    }
                }
                Ok((service.list_notes()?, adopted))
            })
            .await?
        };

        tokio::time::timeout(deadline, self.bridge.push(&merged))
            .await
            .map_err(|_| SyncError::timed_out(SyncStage::Push, deadline))??;

        Ok(SyncReport {
            pulled,
            adopted,
            kept_local: plan.kept_local + (planned - adopted),
            local_only: plan.local_only,
            pushed: merged.len(),
        })
    }

    async fn on_repo<T, F>(&self, call: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&NoteService<R>) -> RepoResult<T> + Send + 'static,
    {
        on_blocking_pool(&self.service, call)
            .await
            .map_err(|err| SyncError::Worker(err.to_string()))?
            .map_err(SyncError::Store)
    }
}

//! # Hash Engine
//!
//! Public face of the crate. One [`HashEngine`] owns the registry, the progress
//! counters, the report, and the worker pool; a presentation layer drives it
//! through `&self` methods and listens on the event receiver returned by
//! [`HashEngine::init`].

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::digest::{DigestError, DigestProvider, DigestSet, StandardDigests};
use crate::notify::Notifier;
use crate::pipeline::Scheduler;
use crate::pipeline::events::EngineEvent;
use crate::pipeline::worker::HashContext;
use crate::progress::{ProgressAggregator, Summary};
use crate::registry::{AddFileError, ClearError, TaskRegistry};
use crate::report::ReportBuilder;
use crate::task::{TaskId, TaskView};

const IDLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("digest provider unusable: {0}")]
    Provider(#[from] DigestError),
}

pub struct HashEngine {
    ctx: Arc<HashContext>,
    scheduler: Scheduler,
}

impl HashEngine {
    /// Build an engine backed by [`StandardDigests`].
    pub fn init(config: &EngineConfig) -> Result<(Self, Receiver<EngineEvent>), EngineError> {
        Self::init_with_provider(config, Arc::new(StandardDigests))
    }

    pub fn init_with_provider(
        config: &EngineConfig,
        provider: Arc<dyn DigestProvider>,
    ) -> Result<(Self, Receiver<EngineEvent>), EngineError> {
        config.validate()?;
        provider.self_check()?;

        let (notifier, events) = Notifier::channel(config.event_capacity);
        let workers = config.worker_count();
        let ctx = Arc::new(HashContext {
            registry: TaskRegistry::new(config.capacity),
            progress: ProgressAggregator::new(workers),
            report: ReportBuilder::new(config.report_interval(), config.report_initial_bytes),
            notifier,
            provider,
            chunk_size: config.chunk_size(),
            notify_interval: config.notify_interval(),
            version_scan_limit: config.version_scan_limit(),
        });
        ctx.report.refresh(true, || ctx.registry.snapshot());

        let scheduler = Scheduler::start(Arc::clone(&ctx));
        info!(
            "engine ready: provider={}, workers={workers}, capacity={}, chunk={} bytes",
            ctx.provider.name(),
            config.capacity,
            ctx.chunk_size
        );
        Ok((Self { ctx, scheduler }, events))
    }

    /// Cancel outstanding work and join the pool. Also runs on drop.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub fn set_worker_count(&self, n: usize) -> usize {
        let applied = self.scheduler.resize(n);
        info!("worker count set to {applied} (requested {n})");
        self.ctx.notifier.notify(EngineEvent::WorkersResized(applied));
        applied
    }

    pub fn worker_count(&self) -> usize {
        self.ctx.progress.worker_count()
    }

    pub fn add_file(
        &self,
        path: impl AsRef<Path>,
        digests: DigestSet,
    ) -> Result<TaskId, AddFileError> {
        let path = path.as_ref();
        let id = self
            .ctx
            .registry
            .add(path, digests, &self.ctx.progress, |task| {
                self.scheduler.submit(task)
            })
            .inspect_err(|err| debug!("add_file refused: {err}"))?;
        self.ctx.report.mark_dirty();
        self.ctx.notifier.notify(EngineEvent::TaskAdded(id));
        Ok(id)
    }

    /// Ask every running and queued task to stop at its next chunk boundary.
    pub fn cancel_all(&self) {
        self.ctx.progress.request_cancel();
        self.ctx.report.mark_dirty();
        info!("cancel requested ({} running)", self.ctx.progress.running());
        self.ctx.notifier.notify(EngineEvent::Canceled);
    }

    pub fn clear_all(&self) -> Result<(), ClearError> {
        if let Err(err) = self.ctx.registry.clear(&self.ctx.progress) {
            warn!("clear refused: {err}");
            return Err(err);
        }
        self.reset_report();
        info!("registry cleared");
        self.ctx.notifier.notify(EngineEvent::Cleared);
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        self.ctx.progress.summary()
    }

    /// Length of the report in chars, after a throttled rebuild.
    pub fn report_len(&self) -> usize {
        self.refresh_report(false);
        self.ctx.report.len()
    }

    /// Copy the report into `dst`, truncated to `capacity - 1` chars.
    pub fn report(&self, dst: &mut String, capacity: usize) -> usize {
        self.refresh_report(false);
        self.ctx.report.copy_into(dst, capacity)
    }

    pub fn report_text(&self) -> String {
        self.refresh_report(false);
        self.ctx.report.text()
    }

    /// Rebuild the report now, ignoring the throttle.
    pub fn force_report(&self) -> String {
        self.refresh_report(true);
        self.ctx.report.text()
    }

    pub fn tasks(&self) -> Vec<TaskView> {
        self.ctx.registry.snapshot()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskView> {
        self.ctx.registry.get(id).map(|task| task.view())
    }

    /// Poll until no task is running. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ctx.progress.running() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Empty the report after a clear. An add that slipped in between the
    /// registry clear and this call has had its dirty mark wiped, so restore it.
    fn reset_report(&self) {
        self.ctx.report.clear();
        if !self.ctx.registry.is_empty() {
            self.ctx.report.mark_dirty();
        }
    }

    fn refresh_report(&self, force: bool) {
        self.ctx
            .report
            .refresh(force, || self.ctx.registry.snapshot());
    }
}

impl Drop for HashEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

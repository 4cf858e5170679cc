mod aggregate;
mod client;
mod discover;
mod fetch;
mod status;
mod types;


pub use aggregate::{aggregate, fleet_status};
pub use client::ForgejoClient;
pub use status::CanonicalStatus;
pub use types::{Job, NormalizedRun, Repository};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::{ForgeWatchError, Result};

const LOG_CAPACITY: usize = 50;

/// Bounded, timestamped log of discovery activity. Oldest entries are
/// discarded once [`LOG_CAPACITY`] is reached.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryLog {
    entries: VecDeque<String>,
}

impl DiscoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_entries(entries: Vec<String>) -> Self {
        let mut log = Self::new();
        log.entries = entries.into_iter().collect();
        log.trim();
        log
    }

    pub fn push(&mut self, message: impl AsRef<str>) {
        self.entries
            .push_back(format!("{} - {}", Local::now().format("%H:%M:%S"), message.as_ref()));
        self.trim();
    }

    fn trim(&mut self) {
        while self.entries.len() > LOG_CAPACITY {
            self.entries.pop_front();
        }
    }

    fn into_entries(self) -> Vec<String> {
        self.entries.into_iter().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Immutable per-cycle engine state. Replaced atomically after every
/// discovery or refresh cycle; consumers hold cheap `Arc` snapshots and never
/// observe a half-updated cycle.
#[derive(Debug, Default)]
pub struct EngineState {
    /// Repositories from the most recent discovery
    pub repositories: Vec<Repository>,
    /// Normalized runs across all discovered repositories
    pub runs: Vec<NormalizedRun>,
    /// When the last successful cycle completed
    pub last_update: Option<DateTime<Utc>>,
    /// Discovery log entries, oldest first
    pub log: Vec<String>,
}

/// Filter patterns and the organization list, fixed at construction. The
/// configuration store owns edits; the engine only reads them.
#[derive(Debug)]
struct Filters {
    organizations: Vec<String>,
    repo_pattern: String,
    workflow_pattern: String,
    branch_pattern: String,
}

/// Owns the acquisition lifecycle: full discovery, lightweight refresh, and
/// the published state snapshots.
///
/// Repositories are fetched strictly sequentially within a cycle to bound
/// simultaneous load on the API. A refresh that outlives the polling interval
/// can overlap the next tick; the busy flag turns the overlapping cycle into
/// a no-op rather than racing two cycles.
pub struct Engine {
    client: ForgejoClient,
    filters: Filters,
    state: watch::Sender<Arc<EngineState>>,
    busy: AtomicBool,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(ForgeWatchError::Config("base-url is not set".to_string()));
        }
        let client = ForgejoClient::new(&config.base_url, config.token.clone())?;
        let (state, _) = watch::channel(Arc::new(EngineState::default()));

        Ok(Self {
            client,
            filters: Filters {
                organizations: config.organizations.clone(),
                repo_pattern: config.repo_pattern.clone(),
                workflow_pattern: config.workflow_pattern.clone(),
                branch_pattern: config.branch_pattern.clone(),
            },
            state,
            busy: AtomicBool::new(false),
        })
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> Arc<EngineState> {
        self.state.borrow().clone()
    }

    /// Subscribe to state replacements. Each published value is a complete
    /// cycle result.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineState>> {
        self.state.subscribe()
    }

    /// Whether a discovery or refresh cycle is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Aggregate the current run set into jobs under the active patterns.
    pub fn jobs(&self) -> Vec<Job> {
        aggregate(
            &self.snapshot().runs,
            &self.filters.workflow_pattern,
            &self.filters.branch_pattern,
        )
    }

    /// Full cycle: discover repositories across organizations and search,
    /// then fetch every matched repository's run history. Replaces the whole
    /// engine state, discovery log included.
    pub async fn discover(&self) -> Result<()> {
        let Some(_guard) = self.begin_cycle() else {
            return Ok(());
        };

        let mut log = DiscoveryLog::new();
        let repositories = discover::discover_repos(
            &self.client,
            &self.filters.organizations,
            &self.filters.repo_pattern,
            &mut log,
        )
        .await;

        let runs = self.collect_runs(&repositories, &mut log).await;
        log.push(format!("{} runs loaded", runs.len()));

        self.publish(repositories, runs, log);
        Ok(())
    }

    /// Lightweight cycle: re-fetch runs for the already-discovered repository
    /// set, skipping discovery entirely. No-op until a discovery has run.
    pub async fn refresh(&self) -> Result<()> {
        let Some(_guard) = self.begin_cycle() else {
            return Ok(());
        };

        let previous = self.snapshot();
        if previous.repositories.is_empty() {
            return Ok(());
        }

        let repositories = previous.repositories.clone();
        let mut log = DiscoveryLog::from_entries(previous.log.clone());
        let runs = self.collect_runs(&repositories, &mut log).await;

        self.publish(repositories, runs, log);
        Ok(())
    }

    /// Fetch runs repository by repository, sequentially. A 404 means the
    /// repository has no actions enabled and is skipped silently; any other
    /// failure is logged and contributes zero runs.
    async fn collect_runs(
        &self,
        repositories: &[Repository],
        log: &mut DiscoveryLog,
    ) -> Vec<NormalizedRun> {
        let mut runs = Vec::new();
        for repo in repositories {
            match self.client.fetch_repo_runs(repo).await {
                Ok(batch) => runs.extend(batch),
                Err(ForgeWatchError::Http { status: 404, .. }) => {}
                Err(err) => log.push(format!("runs for {} failed: {err}", repo.full_name)),
            }
        }
        runs
    }

    fn publish(&self, repositories: Vec<Repository>, runs: Vec<NormalizedRun>, log: DiscoveryLog) {
        self.state.send_replace(Arc::new(EngineState {
            repositories,
            runs,
            last_update: Some(Utc::now()),
            log: log.into_entries(),
        }));
    }

    fn begin_cycle(&self) -> Option<CycleGuard<'_>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("cycle already in progress, skipping");
            return None;
        }
        Some(CycleGuard(&self.busy))
    }
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to the periodic refresh task. Dropping (or calling [`cancel`]) the
/// handle aborts the task, so re-arming after an interval or repository-set
/// change is "drop the old handle, spawn a new one", and teardown can never
/// leave a timer running.
///
/// [`cancel`]: RefreshHandle::cancel
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Arm the periodic refresh. Returns None when `interval_secs` is zero
/// (periodic refresh disabled).
pub fn spawn_refresh(engine: Arc<Engine>, interval_secs: u64) -> Option<RefreshHandle> {
    if interval_secs == 0 {
        return None;
    }

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the cycle it would trigger
        // already ran as part of discovery.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = engine.refresh().await {
                warn!("refresh cycle failed: {err}");
            }
        }
    });

    Some(RefreshHandle { task })
}

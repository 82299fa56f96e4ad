use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use objmig_store::{PackWriter, StreamSource};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::driver::{GroupReport, RepackDriver};
use crate::error::{RepackError, RepackResult};
use crate::mapping::{HashkeyMapping, HashkeyMappingBuilder, SharedMappingBuilder};
use crate::planner::Group;

/// Outcome of a whole migration.
#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub mapping: HashkeyMapping,
    /// One report per group, in plan order.
    pub groups: Vec<GroupReport>,
    pub elapsed: Duration,
}

impl MigrationReport {
    /// Time spent inside the pack writer, summed over all groups.
    pub fn write_time(&self) -> Duration {
        self.groups.iter().map(|g| g.write_time).sum()
    }

    pub fn objects(&self) -> usize {
        self.groups.iter().map(|g| g.objects).sum()
    }

    pub fn bytes_written(&self) -> u64 {
        self.groups.iter().map(|g| g.bytes_written).sum()
    }
}

/// Runs every group of a plan through a [`RepackDriver`] and merges the
/// results into one mapping.
///
/// With `parallelism > 1` groups are handed out to scoped worker threads,
/// each with its own driver and cache; only the mapping builder is shared.
/// The first failing group stops the hand-out of further groups and its
/// error is returned.
pub struct Migration<'a, S: ?Sized, W: ?Sized> {
    source: &'a S,
    writer: &'a W,
    config: MigrationConfig,
}

impl<'a, S, W> Migration<'a, S, W>
where
    S: StreamSource + Sync + ?Sized,
    W: PackWriter + ?Sized,
{
    pub fn new(source: &'a S, writer: &'a W, config: MigrationConfig) -> Self {
        Self {
            source,
            writer,
            config,
        }
    }

    pub fn run(&self, groups: &[Group]) -> RepackResult<MigrationReport> {
        self.run_with(groups, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_group_done` after each group.
    pub fn run_with<F>(&self, groups: &[Group], on_group_done: F) -> RepackResult<MigrationReport>
    where
        F: Fn(&GroupReport) + Sync,
    {
        let start = Instant::now();
        let (mapping, mut reports) = if self.config.parallelism <= 1 || groups.len() <= 1 {
            self.run_sequential(groups, &on_group_done)?
        } else {
            self.run_parallel(groups, &on_group_done)?
        };
        reports.sort_by_key(|r| r.group);
        Ok(MigrationReport {
            mapping,
            groups: reports,
            elapsed: start.elapsed(),
        })
    }

    fn run_sequential<F>(
        &self,
        groups: &[Group],
        on_group_done: &F,
    ) -> RepackResult<(HashkeyMapping, Vec<GroupReport>)>
    where
        F: Fn(&GroupReport) + Sync,
    {
        let driver = RepackDriver::new(self.writer, self.config.repack.clone());
        let mut builder = HashkeyMappingBuilder::new();
        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            info!("{} objects to write in phase {}", group.len(), group.index());
            let report = driver.repack_group(self.source, group, &mut builder)?;
            on_group_done(&report);
            reports.push(report);
        }
        Ok((builder.finish(), reports))
    }

    fn run_parallel<F>(
        &self,
        groups: &[Group],
        on_group_done: &F,
    ) -> RepackResult<(HashkeyMapping, Vec<GroupReport>)>
    where
        F: Fn(&GroupReport) + Sync,
    {
        let workers = self.config.parallelism.min(groups.len());
        info!(workers, groups = groups.len(), "starting parallel migration");

        let shared = SharedMappingBuilder::new();
        let next = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let reports = Mutex::new(Vec::with_capacity(groups.len()));
        let first_error: Mutex<Option<RepackError>> = Mutex::new(None);

        let panicked = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let (shared, next, abort, reports, first_error) =
                        (&shared, &next, &abort, &reports, &first_error);
                    scope.spawn(move || {
                        let driver = RepackDriver::new(self.writer, self.config.repack.clone());
                        let mut sink = shared;
                        while !abort.load(Ordering::Acquire) {
                            let Some(group) = groups.get(next.fetch_add(1, Ordering::AcqRel)) else {
                                break;
                            };
                            info!(
                                worker,
                                "{} objects to write in phase {}",
                                group.len(),
                                group.index()
                            );
                            match driver.repack_group(self.source, group, &mut sink) {
                                Ok(report) => {
                                    on_group_done(&report);
                                    reports.lock().expect("lock poisoned").push(report);
                                }
                                Err(err) => {
                                    warn!(worker, group = group.index(), error = %err, "group failed");
                                    abort.store(true, Ordering::Release);
                                    first_error
                                        .lock()
                                        .expect("lock poisoned")
                                        .get_or_insert(err);
                                    break;
                                }
                            }
                        }
                    })
                })
                .collect();
            handles.into_iter().any(|handle| handle.join().is_err())
        });

        if let Some(err) = first_error.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(err);
        }
        if panicked {
            return Err(RepackError::WorkerPanicked);
        }
        let reports = reports.into_inner().unwrap_or_else(|e| e.into_inner());
        Ok((shared.into_inner().finish(), reports))
    }
}

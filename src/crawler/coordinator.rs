//! Crawl coordinator - the four-level traversal state machine
//!
//! The coordinator drives the entity → branch → sub-branch → leaf traversal,
//! consulting the checkpoint store to decide where to resume, the dedup
//! index to skip known work, and the pending queue to survive a crash
//! mid-batch. It owns both state documents exclusively; the dedup indexes
//! are read-only after construction apart from growing with confirmed
//! appends.
//!
//! Durability discipline:
//! - the checkpoint is saved at the start of each entity and at each
//!   sub-branch selection, always *before* the work it points at
//! - discovered leaf targets are persisted as a batch before any is
//!   processed, and removed one-by-one only after their record is confirmed
//!   appended (or deliberately skipped)
//!
//! Only a lost session aborts the run; every entity- and leaf-level failure
//! is handled locally so a later run can resume with no duplicate output and
//! no lost work.

use crate::config::{CrawlerConfig, OutputConfig};
use crate::crawler::pacing::Pacer;
use crate::nav::{
    FetchOutcome, NavError, NavigationDriver, OpenOutcome, PageFetcher, ParentContext,
    SelectOutcome,
};
use crate::sink::{DedupIndex, EntityRecord, EntityStatus, LeafRecord, OutputSink, StreamKey};
use crate::state::{Checkpoint, CheckpointStore, CrawlScope, LeafTarget, PendingQueue};
use crate::{Result, StrataError};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The full entity range was exhausted
    Done,
    /// The browsing session became unusable; state is saved for resume
    Aborted,
    /// An external stop was honored at a step boundary; state is saved
    Stopped,
}

/// Counters reported at the end of a run
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub entities_visited: u64,
    pub entities_recorded: u64,
    pub leaves_appended: u64,
    pub leaves_skipped: u64,
}

/// How an inner loop wants the enclosing loop to proceed
enum Flow {
    Continue,
    Abort,
    Stop,
}

/// The crawl coordinator
///
/// Generic over the navigation/fetch session and the output sink so tests
/// can drive the state machine with scripted fakes.
pub struct Coordinator<D, S> {
    crawler: CrawlerConfig,
    scope: CrawlScope,
    driver: D,
    sink: S,
    checkpoints: CheckpointStore,
    pending: PendingQueue,
    pending_batch: Vec<LeafTarget>,
    resume: Checkpoint,
    pacer: Pacer,
    stop: Arc<AtomicBool>,
    nav_failures: u32,
    stats: RunStats,
}

impl<D, S> std::fmt::Debug for Coordinator<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}

impl<D, S> Coordinator<D, S>
where
    D: NavigationDriver + PageFetcher,
    S: OutputSink,
{
    /// Creates a coordinator, loading (or clearing, with `fresh`) the
    /// persisted traversal state
    ///
    /// A persisted checkpoint whose range differs from `scope` is rejected:
    /// changing the range is an operator decision, expressed with `fresh`.
    pub fn new(
        crawler: CrawlerConfig,
        output: &OutputConfig,
        scope: CrawlScope,
        driver: D,
        sink: S,
        fresh: bool,
    ) -> Result<Self> {
        let checkpoints = CheckpointStore::new(&output.checkpoint_path);
        let pending = PendingQueue::new(&output.pending_path);

        if fresh {
            tracing::info!("Fresh start requested; clearing checkpoint and pending state");
            checkpoints.reset()?;
            pending.reset()?;
        }

        let resume = match checkpoints.load() {
            Some(checkpoint) if checkpoint.scope != scope => {
                return Err(StrataError::ScopeMismatch {
                    requested: scope,
                    persisted: checkpoint.scope,
                });
            }
            Some(checkpoint) if !checkpoint.scope.contains(checkpoint.entity_id) => {
                tracing::warn!(
                    "Checkpoint entity {} lies outside scope {}; starting from scope start",
                    checkpoint.entity_id,
                    checkpoint.scope
                );
                Checkpoint::start_of(scope)
            }
            Some(checkpoint) => checkpoint,
            None => Checkpoint::start_of(scope),
        };

        let pacer = Pacer::new(crawler.action_pause_ms, crawler.entity_pause_ms);

        Ok(Self {
            crawler,
            scope,
            driver,
            sink,
            checkpoints,
            pending,
            pending_batch: Vec::new(),
            resume,
            pacer,
            stop: Arc::new(AtomicBool::new(false)),
            nav_failures: 0,
            stats: RunStats::default(),
        })
    }

    /// Shared flag that makes the run stop at the next step boundary
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Runs the traversal to completion, abort, or stop
    pub async fn run(&mut self) -> Result<RunOutcome> {
        tracing::info!("Starting crawl over scope {}", self.scope);

        let entity_index = DedupIndex::build(&self.sink, &StreamKey::Entities)?;
        if !entity_index.is_empty() {
            tracing::info!("{} entities already recorded", entity_index.len());
        }

        self.pending_batch = self.pending.load_all();
        if !self.pending_batch.is_empty() {
            tracing::info!(
                "{} pending leaf targets from an interrupted run; they will be drained before any new discovery",
                self.pending_batch.len()
            );
        }

        let resume = self.resume;
        if resume.entity_id > self.scope.lo || resume.main_index > 0 || resume.sub_index > 0 {
            tracing::info!(
                "Resuming at entity {} (branch {}, sub-branch {})",
                resume.entity_id,
                resume.main_index,
                resume.sub_index
            );
        }

        for entity_id in resume.entity_id..=self.scope.hi {
            if self.stop.load(Ordering::Relaxed) {
                return self.finish(RunOutcome::Stopped);
            }

            // Resumed indices apply only to the first entity of this run
            let (main_start, sub_start) = if entity_id == resume.entity_id {
                (resume.main_index, resume.sub_index)
            } else {
                (0, 0)
            };

            self.save_checkpoint(entity_id, 0, 0)?;
            self.stats.entities_visited += 1;

            match self
                .process_entity(entity_id, main_start, sub_start, &entity_index)
                .await?
            {
                Flow::Continue => {}
                Flow::Abort => return self.finish(RunOutcome::Aborted),
                Flow::Stop => return self.finish(RunOutcome::Stopped),
            }

            self.pacer.entity_pause().await;
        }

        tracing::info!("Scope {} exhausted", self.scope);
        self.finish(RunOutcome::Done)
    }

    fn finish(&self, outcome: RunOutcome) -> Result<RunOutcome> {
        tracing::info!(
            "Run summary: {} entities visited, {} entity records appended, \
             {} leaves appended, {} leaves skipped",
            self.stats.entities_visited,
            self.stats.entities_recorded,
            self.stats.leaves_appended,
            self.stats.leaves_skipped
        );
        match outcome {
            RunOutcome::Done => {}
            RunOutcome::Aborted => {
                tracing::error!("Run aborted; checkpoint and pending state are saved for resume")
            }
            RunOutcome::Stopped => {
                tracing::info!("Run stopped; checkpoint and pending state are saved for resume")
            }
        }
        Ok(outcome)
    }

    async fn process_entity(
        &mut self,
        entity_id: u32,
        main_start: usize,
        sub_start: usize,
        entity_index: &DedupIndex,
    ) -> Result<Flow> {
        tracing::info!("==== Processing entity {} ====", entity_id);

        let opened = match self.driver.open_entity(entity_id).await {
            Ok(outcome) => {
                self.nav_ok();
                outcome
            }
            Err(NavError::SessionLost(msg)) => return self.session_lost("opening entity", &msg),
            Err(NavError::Timeout(msg)) => {
                tracing::warn!("Opening entity {} failed: {}", entity_id, msg);
                return Ok(self.nav_failed());
            }
        };

        let known = entity_index.contains(&entity_id.to_string());
        let page_url = self.driver.entity_page_url(entity_id);

        let entity_name = match opened {
            OpenOutcome::NotFound => {
                if known {
                    tracing::debug!("Entity {} already recorded as unavailable", entity_id);
                } else {
                    tracing::warn!("Entity {} not found; recording the outcome", entity_id);
                    self.record_marker(entity_id, page_url, EntityStatus::NotFound)?;
                }
                return Ok(Flow::Continue);
            }
            OpenOutcome::Timeout => {
                if known {
                    tracing::warn!("Entity {} timed out; skipping", entity_id);
                } else {
                    tracing::warn!("Entity {} timed out; recording the outcome", entity_id);
                    self.record_marker(entity_id, page_url, EntityStatus::Timeout)?;
                }
                return Ok(Flow::Continue);
            }
            OpenOutcome::Opened { name } => {
                if known {
                    // Known entities skip the summary fetch, but their leaf
                    // traversal still runs: only leaves are deduplicated
                    tracing::info!("Entity {} already recorded; skipping summary fetch", entity_id);
                    name
                } else {
                    match self.driver.fetch_entity_summary(entity_id).await {
                        Err(NavError::SessionLost(msg)) => {
                            return self.session_lost("fetching entity summary", &msg)
                        }
                        Err(NavError::Timeout(msg)) => {
                            tracing::warn!("Entity {} summary failed: {}", entity_id, msg);
                            self.record_marker(entity_id, page_url, EntityStatus::Timeout)?;
                            return Ok(Flow::Continue);
                        }
                        Ok(FetchOutcome::NotFound) => {
                            tracing::warn!("Entity {} not found; recording the outcome", entity_id);
                            self.record_marker(entity_id, page_url, EntityStatus::NotFound)?;
                            return Ok(Flow::Continue);
                        }
                        Ok(FetchOutcome::Timeout) => {
                            tracing::warn!("Entity {} timed out; recording the outcome", entity_id);
                            self.record_marker(entity_id, page_url, EntityStatus::Timeout)?;
                            return Ok(Flow::Continue);
                        }
                        Ok(FetchOutcome::Fetched(summary)) => {
                            let name = summary.name.clone();
                            self.sink.append_entity(&EntityRecord {
                                entity_id,
                                name: Some(summary.name),
                                emblem_url: summary.emblem_url,
                                tags: summary.tags,
                                description: summary.description,
                                website: summary.website,
                                page_url,
                                status: EntityStatus::Ok,
                                captured_at: Utc::now(),
                            })?;
                            self.stats.entities_recorded += 1;
                            tracing::info!("Recorded entity {}: {}", entity_id, name);
                            Some(name)
                        }
                    }
                }
            }
        };

        let Some(entity_name) = entity_name else {
            tracing::warn!(
                "Entity {} has no usable name; skipping leaf traversal",
                entity_id
            );
            return Ok(Flow::Continue);
        };

        // Leaf identifiers are only unique within their parent entity, so
        // the leaf-scope index is rebuilt here, right before discovery
        let stream = StreamKey::EntityLeaves {
            entity_id,
            entity_name: entity_name.clone(),
        };
        let mut leaf_index = DedupIndex::build(&self.sink, &stream)?;

        self.branch_loop(
            entity_id,
            &entity_name,
            &stream,
            &mut leaf_index,
            main_start,
            sub_start,
        )
        .await
    }

    async fn branch_loop(
        &mut self,
        entity_id: u32,
        entity_name: &str,
        stream: &StreamKey,
        leaf_index: &mut DedupIndex,
        main_start: usize,
        sub_start: usize,
    ) -> Result<Flow> {
        let mut index = main_start;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(Flow::Stop);
            }

            // Enumerate fresh every pass; navigation can shift the set
            let branches = match self.driver.list_branches().await {
                Ok(branches) => branches,
                Err(NavError::SessionLost(msg)) => {
                    return self.session_lost("listing branches", &msg)
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("Listing branches of entity {} failed: {}", entity_id, msg);
                    return Ok(self.nav_failed());
                }
            };

            if branches.is_empty() && index == 0 {
                tracing::info!(
                    "Entity {} has no branch filters; skipping leaf traversal",
                    entity_id
                );
                return Ok(Flow::Continue);
            }
            if index >= branches.len() {
                break;
            }

            let label = branches[index].clone();
            if label_is_unfiltered(&label, &self.crawler.unfiltered_labels) {
                tracing::debug!("Skipping unfiltered branch '{}'", label);
                index += 1;
                continue;
            }

            tracing::info!("Branch ({}/{}): {}", index + 1, branches.len(), label);
            match self.driver.select_branch(index).await {
                Ok(SelectOutcome::Selected) => {
                    self.nav_ok();
                    self.pacer.action_pause().await;
                }
                Ok(SelectOutcome::Stale) => {
                    tracing::warn!("Branch list shifted at index {}; skipping it", index);
                    index += 1;
                    continue;
                }
                Ok(SelectOutcome::Failed) => {
                    tracing::warn!("Selecting branch {} failed", index);
                    if let Flow::Abort = self.nav_failed() {
                        return Ok(Flow::Abort);
                    }
                    index += 1;
                    continue;
                }
                Err(NavError::SessionLost(msg)) => {
                    return self.session_lost("selecting a branch", &msg)
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("Selecting branch {} timed out: {}", index, msg);
                    if let Flow::Abort = self.nav_failed() {
                        return Ok(Flow::Abort);
                    }
                    index += 1;
                    continue;
                }
            }

            // The resumed sub-branch index applies only to the resumed branch
            let sub_from = if index == main_start { sub_start } else { 0 };
            match self
                .subbranch_loop(
                    entity_id,
                    entity_name,
                    &label,
                    stream,
                    leaf_index,
                    index,
                    sub_from,
                )
                .await?
            {
                Flow::Continue => {}
                other => return Ok(other),
            }

            index += 1;
        }
        Ok(Flow::Continue)
    }

    async fn subbranch_loop(
        &mut self,
        entity_id: u32,
        entity_name: &str,
        branch_label: &str,
        stream: &StreamKey,
        leaf_index: &mut DedupIndex,
        main_index: usize,
        sub_start: usize,
    ) -> Result<Flow> {
        let subs = match self.driver.list_sub_branches().await {
            Ok(subs) => subs,
            Err(NavError::SessionLost(msg)) => {
                return self.session_lost("listing sub-branches", &msg)
            }
            Err(NavError::Timeout(msg)) => {
                tracing::warn!("Listing sub-branches failed: {}", msg);
                return Ok(self.nav_failed());
            }
        };

        let meaningful: Vec<usize> = subs
            .iter()
            .enumerate()
            .filter(|(_, label)| !label_is_unfiltered(label, &self.crawler.unfiltered_labels))
            .map(|(index, _)| index)
            .collect();

        if meaningful.len() < 2 {
            // No further narrowing: one pseudo sub-branch so discovery runs
            // exactly once for this branch
            self.save_checkpoint(entity_id, main_index, 0)?;
            return self
                .leaf_drain(entity_id, entity_name, branch_label, None, stream, leaf_index)
                .await;
        }

        for sub_index in meaningful {
            if sub_index < sub_start {
                continue;
            }
            if self.stop.load(Ordering::Relaxed) {
                return Ok(Flow::Stop);
            }

            // This is the position a resume must land on
            self.save_checkpoint(entity_id, main_index, sub_index)?;

            // Re-list fresh right before selecting
            let fresh = match self.driver.list_sub_branches().await {
                Ok(subs) => subs,
                Err(NavError::SessionLost(msg)) => {
                    return self.session_lost("re-listing sub-branches", &msg)
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("Re-listing sub-branches failed: {}", msg);
                    return Ok(self.nav_failed());
                }
            };
            if sub_index >= fresh.len() {
                tracing::warn!(
                    "Sub-branch index {} out of range after refresh; skipping",
                    sub_index
                );
                continue;
            }
            let sub_label = fresh[sub_index].clone();

            tracing::info!("  -> Sub-branch ({}/{}): {}", sub_index + 1, fresh.len(), sub_label);
            match self.driver.select_sub_branch(sub_index).await {
                Ok(SelectOutcome::Selected) => {
                    self.nav_ok();
                    self.pacer.action_pause().await;
                }
                Ok(SelectOutcome::Stale) => {
                    tracing::warn!("Sub-branch list shifted at index {}; skipping it", sub_index);
                    continue;
                }
                Ok(SelectOutcome::Failed) => {
                    tracing::warn!("Selecting sub-branch {} failed", sub_index);
                    if let Flow::Abort = self.nav_failed() {
                        return Ok(Flow::Abort);
                    }
                    continue;
                }
                Err(NavError::SessionLost(msg)) => {
                    return self.session_lost("selecting a sub-branch", &msg)
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("Selecting sub-branch {} timed out: {}", sub_index, msg);
                    if let Flow::Abort = self.nav_failed() {
                        return Ok(Flow::Abort);
                    }
                    continue;
                }
            }

            match self
                .leaf_drain(
                    entity_id,
                    entity_name,
                    branch_label,
                    Some(&sub_label),
                    stream,
                    leaf_index,
                )
                .await?
            {
                Flow::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Continue)
    }

    async fn leaf_drain(
        &mut self,
        entity_id: u32,
        entity_name: &str,
        branch: &str,
        sub_branch: Option<&str>,
        stream: &StreamKey,
        leaf_index: &mut DedupIndex,
    ) -> Result<Flow> {
        if self.pending_batch.is_empty() {
            // Discovery is slow and side-effecting; it only runs when
            // nothing is pending, so an interrupted batch is never
            // re-discovered out from under its own drain
            let candidates = match self.driver.discover_leaves().await {
                Ok(candidates) => {
                    self.nav_ok();
                    candidates
                }
                Err(NavError::SessionLost(msg)) => {
                    return self.session_lost("discovering leaves", &msg)
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("Leaf discovery failed: {}", msg);
                    return Ok(self.nav_failed());
                }
            };

            let total = candidates.len();
            let fresh: Vec<LeafTarget> = candidates
                .into_iter()
                .filter(|candidate| !leaf_index.contains(&candidate.identifier))
                .map(|candidate| LeafTarget {
                    identifier: candidate.identifier,
                    fallback_hint: candidate.fallback_hint,
                })
                .collect();

            if fresh.is_empty() {
                tracing::info!("    No new leaf targets here ({} listed)", total);
                return Ok(Flow::Continue);
            }

            tracing::info!(
                "    Discovered {} new leaf targets ({} of {} already recorded)",
                fresh.len(),
                total - fresh.len(),
                total
            );
            self.pending.save_all(&fresh)?;
            self.pending_batch = fresh;
        } else {
            tracing::info!(
                "    Draining {} pending leaf targets from a previous run",
                self.pending_batch.len()
            );
        }

        while let Some(target) = self.pending_batch.first().cloned() {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(Flow::Stop);
            }

            let context = ParentContext {
                entity_id,
                entity_name,
                branch,
                sub_branch,
            };

            match self.driver.fetch_leaf_record(&target, &context).await {
                Err(NavError::SessionLost(msg)) => {
                    // Leave the queue and checkpoint exactly as last saved;
                    // the next run resumes with this same batch
                    return self.session_lost("fetching a leaf record", &msg);
                }
                Err(NavError::Timeout(msg)) => {
                    tracing::warn!("    Leaf '{}' failed ({}); skipping", target.identifier, msg);
                    self.stats.leaves_skipped += 1;
                }
                Ok(FetchOutcome::Timeout) => {
                    tracing::warn!("    Leaf '{}' timed out; skipping", target.identifier);
                    self.stats.leaves_skipped += 1;
                }
                Ok(FetchOutcome::NotFound) => {
                    tracing::warn!("    Leaf '{}' no longer exists; skipping", target.identifier);
                    self.stats.leaves_skipped += 1;
                }
                Ok(FetchOutcome::Fetched(fields)) => {
                    self.nav_ok();
                    let record = LeafRecord {
                        identifier: target.identifier.clone(),
                        name: fields.name,
                        title: fields.title,
                        entity_name: entity_name.to_string(),
                        branch: branch.to_string(),
                        sub_branch: fields
                            .sub_branch
                            .or_else(|| sub_branch.map(str::to_string)),
                        summary: fields.summary,
                        detail: fields.detail,
                        portrait_url: fields
                            .portrait_url
                            .or_else(|| target.fallback_hint.clone()),
                        captured_at: Utc::now(),
                    };
                    self.sink.append_leaf(stream, &record)?;
                    leaf_index.insert(target.identifier.clone());
                    self.stats.leaves_appended += 1;
                    tracing::info!(
                        "    Recorded leaf: {}",
                        record.name.as_deref().unwrap_or(&target.identifier)
                    );
                }
            }

            // Confirmed appended or deliberately skipped: drop the target
            // from the durable batch first, then from memory
            self.pending.remove(&target.identifier)?;
            self.pending_batch.remove(0);
            self.pacer.action_pause().await;
        }

        Ok(Flow::Continue)
    }

    fn record_marker(&mut self, entity_id: u32, page_url: String, status: EntityStatus) -> Result<()> {
        self.sink
            .append_entity(&EntityRecord::marker(entity_id, page_url, status))?;
        self.stats.entities_recorded += 1;
        Ok(())
    }

    fn save_checkpoint(&self, entity_id: u32, main_index: usize, sub_index: usize) -> Result<()> {
        let checkpoint = Checkpoint {
            scope: self.scope,
            entity_id,
            main_index,
            sub_index,
        };
        self.checkpoints.save(&checkpoint)?;
        Ok(())
    }

    fn nav_ok(&mut self) {
        self.nav_failures = 0;
    }

    /// Counts one navigation-primitive failure toward the abort threshold
    fn nav_failed(&mut self) -> Flow {
        self.nav_failures += 1;
        if self.nav_failures >= self.crawler.max_consecutive_nav_failures {
            tracing::error!(
                "{} consecutive navigation failures; aborting run",
                self.nav_failures
            );
            Flow::Abort
        } else {
            Flow::Continue
        }
    }

    fn session_lost(&self, action: &str, msg: &str) -> Result<Flow> {
        tracing::error!("Session lost while {}: {}", action, msg);
        Ok(Flow::Abort)
    }
}

/// Returns true if a filter label denotes "no filter / show all"
///
/// Matched as a substring: sources commonly render these as e.g. "全部科室".
fn label_is_unfiltered(label: &str, unfiltered: &[String]) -> bool {
    unfiltered.iter().any(|marker| label.contains(marker.as_str()))
}

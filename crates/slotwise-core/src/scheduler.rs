//! The poll loop.
//!
//! One iteration: fetch the latest block; if it is new, walk every target
//! through its [`ActionGate`], ask the executor for payloads, submit them
//! (singly or packed into batches), record what succeeded and report.
//! Between iterations the loop sleeps for the poll interval or until the
//! executor's next interesting timestamp.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{pack, Batch, BatchLimits};
use crate::chain::{ChainClient, ChainError, TargetFilter};
use crate::clock::EpochPosition;
use crate::config::Config;
use crate::error::{Result, SlotError};
use crate::executor::{ActionExecutor, DueTarget, ExecutionMode, Plan, PlanInput, Planned};
use crate::gate::{ActionGate, GateDecision, Resolution};
use crate::report::CycleReport;
use crate::store::{ActedEpochCache, EpochStore};
use crate::submit::BatchSubmitter;
use crate::types::{ActionResult, PendingAction, SkipReason, Target};

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Settings / context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub max_idle_sleep: Duration,
    pub verify_epoch_on_chain: bool,
    pub limits: BatchLimits,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.schedule.poll_interval_seconds),
            max_idle_sleep: Duration::from_secs(config.schedule.max_idle_sleep_seconds),
            verify_epoch_on_chain: config.schedule.verify_epoch_on_chain,
            limits: config.batch.limits(),
        }
    }
}

/// Everything the loop carries from one iteration to the next.
pub struct SchedulerContext<S> {
    /// Epoch lengths discovered as `0` are filled in here once resolved.
    pub targets: Vec<Target>,
    pub cache: ActedEpochCache<S>,
    pub gate: ActionGate,
    pub last_block: Option<u64>,
    /// Report of the last processed block, kept even when recording failed.
    pub last_report: Option<CycleReport>,
}

#[derive(Debug)]
pub enum StepOutcome {
    /// The latest block was not newer than the last processed one.
    NoNewBlock { block: u64 },
    ChainUnavailable(ChainError),
    Processed(CycleReport),
    /// Shutdown was requested while targets were being evaluated.
    Shutdown,
}

/// Discover the targets the agent works on, failing when none match.
pub async fn discover_targets(chain: &dyn ChainClient, filter: &TargetFilter) -> Result<Vec<Target>> {
    let targets = chain.discover_targets(filter).await?;
    if targets.is_empty() {
        return Err(SlotError::NoTargets);
    }
    tracing::info!(count = targets.len(), "targets discovered");
    Ok(targets)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<S> {
    chain: Arc<dyn ChainClient>,
    executor: Box<dyn ActionExecutor>,
    submitter: BatchSubmitter,
    settings: SchedulerSettings,
    ctx: SchedulerContext<S>,
    shutdown: Arc<AtomicBool>,
}

impl<S: EpochStore> Scheduler<S> {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        executor: Box<dyn ActionExecutor>,
        cache: ActedEpochCache<S>,
        targets: Vec<Target>,
        settings: SchedulerSettings,
        submitter: BatchSubmitter,
    ) -> Self {
        let gate = ActionGate::new(executor.window());
        Self {
            chain,
            executor,
            submitter,
            settings,
            ctx: SchedulerContext {
                targets,
                cache,
                gate,
                last_block: None,
                last_report: None,
            },
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops the loop at the next target or iteration.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn context(&self) -> &SchedulerContext<S> {
        &self.ctx
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run until shutdown or until `max_steps` iterations have been taken.
    ///
    /// Returns the last processed cycle's report. Only cache failures end
    /// the loop with an error.
    pub async fn run(&mut self, max_steps: Option<u64>) -> Result<Option<CycleReport>> {
        tracing::info!(
            agent = self.executor.name(),
            targets = self.ctx.targets.len(),
            "scheduler started"
        );
        let mut last = None;
        let mut steps = 0u64;
        loop {
            if self.stopping() {
                tracing::info!("shutdown requested, stopping");
                break;
            }
            let outcome = self.take_step().await?;
            steps += 1;
            let pause = self.pause_after(&outcome);
            match outcome {
                StepOutcome::Processed(report) => last = Some(report),
                StepOutcome::Shutdown => break,
                StepOutcome::NoNewBlock { .. } | StepOutcome::ChainUnavailable(_) => {}
            }
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }
            self.sleep(pause).await;
        }
        Ok(last)
    }

    /// One poll iteration.
    pub async fn take_step(&mut self) -> Result<StepOutcome> {
        let block = match self.chain.latest_block().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch latest block");
                return Ok(StepOutcome::ChainUnavailable(e));
            }
        };
        if self.ctx.last_block.is_some_and(|seen| block.number <= seen) {
            tracing::trace!(block = block.number, "no new block");
            return Ok(StepOutcome::NoNewBlock {
                block: block.number,
            });
        }
        self.ctx.last_block = Some(block.number);
        let now = block.timestamp;
        let mut report = CycleReport::new(self.executor.name(), block);

        let Some(due) = self.collect_due(now, &mut report).await else {
            self.ctx.gate.reset_due();
            return Ok(StepOutcome::Shutdown);
        };

        let mut record_err = None;
        if !due.is_empty() {
            let results = self.act(now, &due, &mut report).await;
            let settled = settle(&results);
            for r in results {
                report.push(r);
            }
            for d in &due {
                let key = (d.target.address.clone(), d.epoch);
                let resolution = match settled.get(&key) {
                    Some(true) => match self.ctx.cache.record(&key.0, key.1) {
                        Ok(()) => Resolution::Succeeded,
                        Err(e) => {
                            tracing::error!(
                                addr = %key.0,
                                epoch = key.1,
                                error = %e,
                                "confirmed on chain but could not record"
                            );
                            record_err.get_or_insert(e);
                            Resolution::Failed
                        }
                    },
                    Some(false) => Resolution::Failed,
                    None => Resolution::Declined,
                };
                self.ctx.gate.resolve(&key.0, key.1, resolution);
            }
        }

        self.executor.on_cycle(&report);
        if !report.is_empty() {
            report.log();
        }
        self.ctx.last_report = Some(report.clone());
        match record_err {
            Some(e) => Err(e),
            None => Ok(StepOutcome::Processed(report)),
        }
    }

    /// Walk every target through the gate. `None` means shutdown interrupted
    /// the walk.
    async fn collect_due(&mut self, now: u64, report: &mut CycleReport) -> Option<Vec<DueTarget>> {
        let mut due = Vec::new();
        for i in 0..self.ctx.targets.len() {
            if self.stopping() {
                return None;
            }
            if !self.resolve_epoch_length(i).await {
                continue;
            }
            let target = self.ctx.targets[i].clone();
            let cadence = self.executor.cadence(&target);
            let Some(mut position) = EpochPosition::at(now, cadence) else {
                tracing::warn!(addr = %target.address, "zero cadence, skipping target");
                continue;
            };

            if self.settings.verify_epoch_on_chain && cadence == target.seconds_per_epoch {
                match self.chain.current_epoch(&target).await {
                    Ok(on_chain) if on_chain != position.epoch => {
                        tracing::warn!(
                            addr = %target.address,
                            local = position.epoch,
                            on_chain,
                            "epoch mismatch, using the contract's"
                        );
                        position = position.with_epoch(on_chain);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(
                        addr = %target.address,
                        error = %e,
                        "could not verify epoch, using local arithmetic"
                    ),
                }
            }

            let eval = self
                .ctx
                .gate
                .evaluate(&target.address, &position, &self.ctx.cache);
            if let Some(missed) = eval.missed {
                if self.executor.reports_missed_windows() {
                    tracing::warn!(addr = %target.address, epoch = missed, "action window missed");
                    report.push_skip(&target.address, missed, SkipReason::MissedWindow);
                } else {
                    tracing::info!(
                        addr = %target.address,
                        epoch = missed,
                        "window closed after failure, shortfall carries over"
                    );
                }
            }
            match eval.decision {
                GateDecision::Due { epoch } => {
                    tracing::debug!(
                        addr = %target.address,
                        epoch,
                        seconds_left = position.seconds_left,
                        "target due"
                    );
                    due.push(DueTarget {
                        target,
                        epoch,
                        position,
                    });
                }
                other => tracing::trace!(addr = %target.address, decision = ?other, "not due"),
            }
        }
        for d in &due {
            self.ctx.gate.begin(&d.target.address, d.epoch);
        }
        Some(due)
    }

    /// Fill in an unknown epoch length from the chain. `false` skips the
    /// target for this poll.
    async fn resolve_epoch_length(&mut self, i: usize) -> bool {
        if self.ctx.targets[i].seconds_per_epoch > 0 {
            return true;
        }
        let target = &self.ctx.targets[i];
        match self.chain.seconds_per_epoch(target).await {
            Ok(spe) if spe > 0 => {
                tracing::info!(addr = %target.address, seconds_per_epoch = spe, "epoch length resolved");
                self.ctx.targets[i].seconds_per_epoch = spe;
                true
            }
            Ok(_) => {
                let err = SlotError::ZeroEpochLength(target.address.clone());
                tracing::warn!(error = %err, "skipping target");
                false
            }
            Err(e) => {
                tracing::warn!(addr = %target.address, error = %e, "could not fetch epoch length");
                false
            }
        }
    }

    /// Plan and submit for every due target.
    async fn act(&mut self, now: u64, due: &[DueTarget], report: &mut CycleReport) -> Vec<ActionResult> {
        let input = PlanInput {
            now,
            due,
            total_targets: self.ctx.targets.len(),
        };
        let planned = match self.executor.plan(self.chain.as_ref(), input).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "executor failed to plan");
                due.iter()
                    .map(|d| {
                        Planned::skip(d, SkipReason::Unavailable {
                            detail: e.to_string(),
                        })
                    })
                    .collect()
            }
        };

        let mut actions = Vec::new();
        for p in planned {
            match p.plan {
                Plan::Act(action) => actions.push(action),
                Plan::Skip(reason) => {
                    // Declined plans are retried every poll; report the first.
                    if self.ctx.gate.first_decline(&p.target, p.epoch) {
                        report.push_skip(&p.target, p.epoch, reason);
                    } else {
                        tracing::trace!(addr = %p.target, epoch = p.epoch, "still declined");
                    }
                }
            }
        }

        let batches: Vec<Batch> = match self.executor.mode() {
            ExecutionMode::Single => actions.into_iter().map(|a| vec![a]).collect(),
            ExecutionMode::Batched => {
                let limits = BatchLimits::new(
                    self.executor.max_batch_size(self.settings.limits.max_batch_size),
                    self.settings.limits.max_targets_per_batch,
                );
                pack(&actions, limits)
            }
        };

        let chain = self.chain.as_ref();
        let mut results = Vec::new();
        let mut pending = batches.into_iter();
        for batch in pending.by_ref() {
            if self.stopping() {
                interrupted(report, &batch);
                break;
            }
            results.extend(self.submitter.submit_batch(chain, &batch).await);
        }
        for batch in pending {
            interrupted(report, &batch);
        }
        results
    }

    fn pause_after(&self, outcome: &StepOutcome) -> Duration {
        let pause = match outcome {
            StepOutcome::Processed(report) => {
                let now = report.block.timestamp;
                self.executor
                    .next_wake(now, report)
                    .map(|wake| Duration::from_secs(wake.saturating_sub(now)))
                    .unwrap_or(self.settings.poll_interval)
            }
            _ => self.settings.poll_interval,
        };
        pause.min(self.settings.max_idle_sleep)
    }

    async fn sleep(&self, total: Duration) {
        let mut left = total;
        while !left.is_zero() && !self.stopping() {
            let chunk = left.min(SHUTDOWN_POLL);
            tokio::time::sleep(chunk).await;
            left -= chunk;
        }
    }
}

/// Leave a trace of planned actions that shutdown kept off the chain.
fn interrupted(report: &mut CycleReport, batch: &[PendingAction]) {
    for action in batch {
        tracing::warn!(
            addr = %action.target,
            epoch = action.epoch,
            size = action.size(),
            "not submitted, shutting down"
        );
        report.push_skip(&action.target, action.epoch, SkipReason::Interrupted);
    }
}

/// `(target, epoch) -> every piece succeeded`.
fn settle(results: &[ActionResult]) -> BTreeMap<(String, u64), bool> {
    let mut out = BTreeMap::new();
    for r in results {
        let ok = out
            .entry((r.action.target.clone(), r.action.epoch))
            .or_insert(true);
        *ok &= r.outcome.is_success();
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

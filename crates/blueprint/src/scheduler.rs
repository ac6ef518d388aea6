//! Execution scheduler - applies a plan level by level
//!
//! Levels run strictly in order. Inside a level changes run concurrently on a
//! rayon pool; each pool thread owns one worker slot holding its session and
//! the [`ExecutionContext`] cached for that session. A change whose
//! dependency did not apply is skipped, and the skip propagates level by
//! level to everything downstream.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::context::{
    AutoConfirm, ConfirmCallback, ExecutionContext, NoProgress, ProgressCallback, Session,
    Transport,
};
use crate::error::{Error, Result, SessionError};
use crate::identity::Urn;
use crate::plan::{Plan, ResourceChange};
use crate::types::{Action, ChangeStatus, ExecuteOptions, ExecuteSummary};

/// A statement as it was (or, in a dry run, would have been) sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedStatement {
    pub urn: Urn,
    /// Role in effect when the statement ran
    pub role: Option<String>,
    pub sql: String,
}

/// Terminal state of one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOutcome {
    pub urn: Urn,
    pub action: Action,
    pub level: usize,
    #[serde(flatten)]
    pub status: ChangeStatus,
    pub statements: Vec<ExecutedStatement>,
}

/// Result of applying a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    /// One outcome per change, in plan order
    pub outcomes: Vec<ChangeOutcome>,
    /// Every statement in execution order
    pub statements: Vec<ExecutedStatement>,
}

impl ApplyReport {
    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for outcome in &self.outcomes {
            summary.add(outcome.action, &outcome.status);
        }
        summary
    }

    /// Outcomes that did not apply
    pub fn failures(&self) -> impl Iterator<Item = &ChangeOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_success())
    }

    pub fn outcome(&self, urn: &Urn) -> Option<&ChangeOutcome> {
        self.outcomes.iter().find(|o| &o.urn == urn)
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

/// One pool thread's session and cached session state
#[derive(Default)]
struct Worker {
    context: ExecutionContext,
    session: Option<Box<dyn Session>>,
}

impl Worker {
    fn send(&mut self, transport: &dyn Transport, dry_run: bool, sql: &str) -> std::result::Result<(), SessionError> {
        if dry_run {
            return Ok(());
        }
        let session = match &mut self.session {
            Some(session) => session,
            slot => slot.insert(transport.open_session()?),
        };
        session.execute(sql)
    }
}

fn lock_worker(worker: &Mutex<Worker>) -> std::sync::MutexGuard<'_, Worker> {
    match worker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn push_statement(log: &Mutex<Vec<ExecutedStatement>>, statement: ExecutedStatement) {
    match log.lock() {
        Ok(mut locked) => locked.push(statement),
        Err(poisoned) => poisoned.into_inner().push(statement),
    }
}

fn into_statements(log: Mutex<Vec<ExecutedStatement>>) -> Vec<ExecutedStatement> {
    match log.into_inner() {
        Ok(collected) => collected,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared, read-only state every change in a level runs against
struct LevelRun<'a> {
    statuses: &'a HashMap<Urn, ChangeStatus>,
    workers: &'a [Mutex<Worker>],
    transport: &'a dyn Transport,
    opts: &'a ExecuteOptions,
    log: &'a Mutex<Vec<ExecutedStatement>>,
}

impl LevelRun<'_> {
    fn run(&self, change: &ResourceChange) -> ChangeOutcome {
        let mut outcome = ChangeOutcome {
            urn: change.urn.clone(),
            action: change.action,
            level: change.level,
            status: ChangeStatus::Applied,
            statements: Vec::new(),
        };

        if let Some(reason) = &change.rejection {
            outcome.status = ChangeStatus::Failed {
                error: reason.clone(),
            };
            return outcome;
        }
        if let Some(blocked) = change
            .depends_on
            .iter()
            .find(|d| self.statuses.get(*d).is_some_and(ChangeStatus::blocks_dependents))
        {
            outcome.status = ChangeStatus::Skipped {
                reason: format!("dependency {blocked} did not apply"),
            };
            return outcome;
        }
        if change.action == Action::Noop {
            return outcome;
        }

        let slot = rayon::current_thread_index().unwrap_or(0) % self.workers.len();
        let mut worker = lock_worker(&self.workers[slot]);

        for statement in &change.statements {
            let switches = worker.context.switches_for(
                &statement.role,
                &change.session,
                self.opts.use_secondary_roles,
            );
            for switch in switches {
                let sql = switch.sql();
                if let Err(e) = worker.send(self.transport, self.opts.dry_run, &sql) {
                    outcome.status = self.failed(change, &sql, &e);
                    return outcome;
                }
                worker.context.commit(&switch);
                self.record(&mut outcome, worker.context.role(), sql);
            }

            if let Err(e) = worker.send(self.transport, self.opts.dry_run, &statement.sql) {
                outcome.status = self.failed(change, &statement.sql, &e);
                return outcome;
            }
            self.record(&mut outcome, worker.context.role(), statement.sql.clone());
        }
        outcome
    }

    fn record(&self, outcome: &mut ChangeOutcome, role: Option<&str>, sql: String) {
        debug!("[{}] > {sql}", role.unwrap_or("-"));
        let statement = ExecutedStatement {
            urn: outcome.urn.clone(),
            role: role.map(str::to_string),
            sql,
        };
        push_statement(self.log, statement.clone());
        outcome.statements.push(statement);
    }

    fn failed(&self, change: &ResourceChange, sql: &str, error: &SessionError) -> ChangeStatus {
        let error = Error::Execution {
            urn: change.urn.clone(),
            message: format!("{sql}: {error}"),
        };
        warn!("{error}");
        ChangeStatus::Failed {
            error: error.to_string(),
        }
    }
}

/// Apply a plan with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Arguments
/// * `plan` - The plan to run
/// * `transport` - Opens one session per worker, lazily; never used in a dry run
/// * `opts` - Execution options (dry_run, jobs, secondary roles)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback, asked once before a live run
///
/// # Returns
/// One outcome per change plus the statement log. Statement failures are
/// reported as outcomes; `Err` is reserved for failures to start at all.
pub fn execute<P, C>(
    plan: &Plan,
    transport: &dyn Transport,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut report = ApplyReport {
        dry_run: opts.dry_run,
        ..ApplyReport::default()
    };

    if !opts.dry_run && !plan.is_noop() {
        let prompt = format!("Apply {} change(s)?", plan.actionable().count());
        let confirmed = confirm.confirm(&prompt).unwrap_or_else(|e| {
            warn!("Confirmation failed: {e}");
            false
        });
        if !confirmed {
            info!("Apply declined");
            report.outcomes = plan
                .changes()
                .iter()
                .map(declined)
                .collect();
            return Ok(report);
        }
    }

    let jobs = opts.jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;
    let workers: Vec<Mutex<Worker>> = (0..jobs).map(|_| Mutex::new(Worker::default())).collect();
    let log = Mutex::new(Vec::new());
    let mut statuses: HashMap<Urn, ChangeStatus> = HashMap::new();

    for (level, changes) in plan.levels() {
        debug!("Level {level}: {} change(s)", changes.len());
        progress.on_level_start(level, changes.len());

        let run = LevelRun {
            statuses: &statuses,
            workers: &workers,
            transport,
            opts,
            log: &log,
        };
        let outcomes: Vec<ChangeOutcome> =
            pool.install(|| changes.par_iter().map(|change| run.run(change)).collect());

        for outcome in outcomes {
            progress.on_change_complete(&outcome.urn, &outcome.status);
            statuses.insert(outcome.urn.clone(), outcome.status.clone());
            report.outcomes.push(outcome);
        }
        progress.on_level_complete(level);
    }

    report.statements = into_statements(log);
    let summary = report.summary();
    info!(
        "Applied {} change(s): {} failed, {} skipped",
        summary.total_changes(),
        summary.failed,
        summary.skipped
    );
    Ok(report)
}

fn declined(change: &ResourceChange) -> ChangeOutcome {
    ChangeOutcome {
        urn: change.urn.clone(),
        action: change.action,
        level: change.level,
        status: ChangeStatus::Skipped {
            reason: "apply declined".to_string(),
        },
        statements: Vec::new(),
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plan: &Plan, transport: &dyn Transport, opts: &ExecuteOptions) -> Result<ApplyReport> {
    execute(plan, transport, opts, &mut NoProgress, &mut AutoConfirm)
}

//! The driver loop: pop a job, classify it, record it or branch on it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::error::SearchError;
use crate::evaluator::{Classification, Evaluator, Limits, UnknownReason};
use crate::machine::{Job, MAX_STATES, MAX_SYMBOLS, TransitionTable};
use crate::queue::{LocalQueue, WorkQueue};
use crate::record::{Outcome, Record, RecordSink};
use crate::rng::{SplitMix64, shuffle};
use crate::tnf::enumerate_children;

/// What is being searched. Fixed for the lifetime of a run, checkpoint included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub num_states: usize,
    pub num_symbols: usize,
    pub max_transitions: Option<usize>,
    /// Seed the root with `A0 -> 1RB` instead of branching on it.
    pub first_1rb: bool,
    pub randomize: bool,
    pub seed: u64,
}

impl SearchParams {
    pub fn new(num_states: usize, num_symbols: usize) -> Self {
        Self {
            num_states,
            num_symbols,
            max_transitions: None,
            first_1rb: false,
            randomize: false,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if !(1..=MAX_STATES).contains(&self.num_states) {
            return Err(SearchError::Config(format!(
                "states must be between 1 and {MAX_STATES}, got {}",
                self.num_states
            )));
        }
        if !(2..=MAX_SYMBOLS).contains(&self.num_symbols) {
            return Err(SearchError::Config(format!(
                "symbols must be between 2 and {MAX_SYMBOLS}, got {}",
                self.num_symbols
            )));
        }
        if self.max_transitions == Some(0) {
            return Err(SearchError::Config("max transitions must be at least 1".into()));
        }
        Ok(())
    }

    /// The job every search starts from.
    pub fn root_job(&self) -> Job {
        let root = Job::root(self.num_states, self.num_symbols, self.max_transitions);
        if self.first_1rb { root.with_first_transition() } else { root }
    }

    fn initial_rng(&self) -> Option<SplitMix64> {
        self.randomize.then(|| SplitMix64::seeded(self.seed))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumStats {
    /// Jobs popped and evaluated.
    pub tm_num: u64,
    pub num_halt: u64,
    pub num_infinite: u64,
    /// Classified `Unknown` by the evaluator.
    pub num_unresolved: u64,
    pub num_branched: u64,
    pub num_children: u64,
    /// Left in the queue when the budget ran out.
    pub num_not_run: u64,
    pub best_steps: u64,
    pub best_steps_table: Option<TransitionTable>,
    pub best_score: u64,
    pub best_score_table: Option<TransitionTable>,
}

impl EnumStats {
    /// Jobs that ended in a record.
    pub fn num_terminal(&self) -> u64 {
        self.num_halt + self.num_infinite + self.num_unresolved
    }

    fn record_halt(&mut self, table: &TransitionTable, steps: u64, score: u64) {
        self.num_halt += 1;
        if steps > self.best_steps {
            self.best_steps = steps;
            self.best_steps_table = Some(table.clone());
        }
        if score > self.best_score {
            self.best_score = score;
            self.best_score_table = Some(table.clone());
        }
    }

    /// Folds another worker's counters into these.
    pub fn merge(&mut self, other: &EnumStats) {
        self.tm_num += other.tm_num;
        self.num_halt += other.num_halt;
        self.num_infinite += other.num_infinite;
        self.num_unresolved += other.num_unresolved;
        self.num_branched += other.num_branched;
        self.num_children += other.num_children;
        self.num_not_run += other.num_not_run;
        if other.best_steps > self.best_steps {
            self.best_steps = other.best_steps;
            self.best_steps_table = other.best_steps_table.clone();
        }
        if other.best_score > self.best_score {
            self.best_score = other.best_score;
            self.best_score_table = other.best_score_table.clone();
        }
    }
}

/// How a run is driven, as opposed to what it searches.
#[derive(Debug, Clone)]
pub struct EnumSettings {
    pub limits: Limits,
    /// Stop after this many jobs in this invocation and record the rest as not run.
    pub num_enum: Option<u64>,
    pub save_freq: Option<u64>,
    pub checkpoint: Option<PathBuf>,
    pub progress_interval: u64,
}

impl Default for EnumSettings {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            num_enum: None,
            save_freq: None,
            checkpoint: None,
            progress_interval: 10_000,
        }
    }
}

/// Everything the loop mutates besides the queue.
#[derive(Debug, Clone)]
pub struct EnumeratorContext {
    pub run_id: Uuid,
    pub params: SearchParams,
    pub settings: EnumSettings,
    pub stats: EnumStats,
    pub rng: Option<SplitMix64>,
    /// Jobs processed since this process started, for `num_enum`.
    processed: u64,
}

impl EnumeratorContext {
    pub fn new(params: SearchParams, settings: EnumSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            rng: params.initial_rng(),
            params,
            settings,
            stats: EnumStats::default(),
            processed: 0,
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.settings.num_enum.is_some_and(|budget| self.processed >= budget)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Processed,
    /// No work is left anywhere.
    Exhausted,
    /// `num_enum` reached; the queue still holds work.
    BudgetReached,
}

type ProgressFn<'a> = Box<dyn FnMut(&EnumStats, usize) + 'a>;

pub struct Enumerator<'a, Q, E, S> {
    ctx: EnumeratorContext,
    queue: Q,
    evaluator: E,
    sink: S,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, Q: WorkQueue, E: Evaluator, S: RecordSink> Enumerator<'a, Q, E, S> {
    /// An enumerator over whatever `queue` holds. Use [`Enumerator::seed`]
    /// to start a fresh search from the root.
    pub fn new(ctx: EnumeratorContext, queue: Q, evaluator: E, sink: S) -> Self {
        Self {
            ctx,
            queue,
            evaluator,
            sink,
            progress: None,
        }
    }

    /// Called every `progress_interval` jobs and once at the end with the
    /// counters and the local queue length.
    pub fn on_progress(mut self, progress: impl FnMut(&EnumStats, usize) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Pushes the root job.
    pub fn seed(&mut self) -> Result<(), SearchError> {
        let root = self.ctx.params.root_job();
        info!(table = %root.table, "search seeded");
        self.queue.push_job(root)?;
        Ok(())
    }

    pub fn stats(&self) -> &EnumStats {
        &self.ctx.stats
    }

    pub fn context(&self) -> &EnumeratorContext {
        &self.ctx
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn into_parts(self) -> (EnumeratorContext, Q, S) {
        (self.ctx, self.queue, self.sink)
    }

    /// Processes a single job.
    pub fn step(&mut self) -> Result<StepOutcome, SearchError> {
        if self.ctx.budget_exhausted() {
            return Ok(StepOutcome::BudgetReached);
        }
        let Some(job) = self.queue.pop_job()? else {
            return Ok(StepOutcome::Exhausted);
        };
        self.ctx.stats.tm_num += 1;
        self.ctx.processed += 1;

        let classification = self
            .evaluator
            .evaluate(&job.table, &self.ctx.settings.limits)
            .map_err(|source| {
                error!(table = %job.table, error = %source, "evaluator failed");
                SearchError::Evaluator {
                    table: job.table.to_string(),
                    source,
                }
            })?;

        match classification {
            Classification::Halt { steps, score } => {
                self.ctx.stats.record_halt(&job.table, steps, score);
                self.emit(job.table, Outcome::Halt { steps, score })?;
            }
            Classification::Infinite { reason } => {
                self.ctx.stats.num_infinite += 1;
                self.emit(job.table, Outcome::Infinite { reason })?;
            }
            Classification::Unknown { reason, detail } => {
                self.ctx.stats.num_unresolved += 1;
                self.emit(job.table, Outcome::Unknown { reason, detail })?;
            }
            Classification::UndefinedCell { state, symbol, .. } => {
                self.branch(&job, state, symbol)?
            }
        }

        let tm_num = self.ctx.stats.tm_num;
        let interval = self.ctx.settings.progress_interval;
        if interval > 0 && tm_num % interval == 0 {
            self.report_progress();
        }
        if let Some(freq) = self.ctx.settings.save_freq {
            if freq > 0 && tm_num % freq == 0 {
                self.save_checkpoint()?;
            }
        }
        Ok(StepOutcome::Processed)
    }

    fn branch(&mut self, job: &Job, state: u8, symbol: u8) -> Result<(), SearchError> {
        let mut children = enumerate_children(job, state, symbol);
        if let Some(rng) = self.ctx.rng {
            self.ctx.rng = Some(shuffle(&mut children, rng));
        }
        debug!(table = %job.table, state, symbol, children = children.len(), "branching");
        self.ctx.stats.num_branched += 1;
        self.ctx.stats.num_children += children.len() as u64;
        self.queue.push_jobs(children)?;
        Ok(())
    }

    fn emit(&mut self, table: TransitionTable, outcome: Outcome) -> Result<(), SearchError> {
        self.sink.write_record(&Record::new(table, outcome))
    }

    fn report_progress(&mut self) {
        let len = self.queue.len();
        debug!(
            tm_num = self.ctx.stats.tm_num,
            halt = self.ctx.stats.num_halt,
            infinite = self.ctx.stats.num_infinite,
            unknown = self.ctx.stats.num_unresolved,
            queue = len,
            "progress"
        );
        if let Some(progress) = self.progress.as_mut() {
            progress(&self.ctx.stats, len);
        }
    }

    /// Records every job still queued as not run.
    fn drain_not_run(&mut self) -> Result<(), SearchError> {
        let mut drained = 0u64;
        while let Some(job) = self.queue.pop_job()? {
            self.emit(
                job.table,
                Outcome::Unknown {
                    reason: UnknownReason::NotRun,
                    detail: String::new(),
                },
            )?;
            drained += 1;
        }
        self.ctx.stats.num_not_run += drained;
        warn!(jobs = drained, "budget reached, remaining jobs recorded as not run");
        Ok(())
    }

    /// Loops until the queue is exhausted or the budget is spent.
    pub fn run(&mut self) -> Result<EnumStats, SearchError> {
        let outcome = loop {
            match self.step()? {
                StepOutcome::Processed => {}
                stop => break stop,
            }
        };
        // The checkpoint keeps the frontier; only the sink sees the drain.
        if self.ctx.settings.checkpoint.is_some() {
            self.save_checkpoint()?;
        }
        if outcome == StepOutcome::BudgetReached {
            self.drain_not_run()?;
        }
        self.sink.flush()?;
        self.report_progress();
        let stats = &self.ctx.stats;
        info!(
            tm_num = stats.tm_num,
            halt = stats.num_halt,
            infinite = stats.num_infinite,
            unknown = stats.num_unresolved,
            best_steps = stats.best_steps,
            best_score = stats.best_score,
            "enumeration finished"
        );
        Ok(stats.clone())
    }

    /// Writes a checkpoint if a path is configured.
    pub fn save_checkpoint(&mut self) -> Result<(), SearchError> {
        let Some(path) = self.ctx.settings.checkpoint.clone() else {
            return Ok(());
        };
        self.sink.flush()?;
        Checkpoint::capture(&self.ctx, self.queue.snapshot()).save(&path)?;
        debug!(path = %path.display(), tm_num = self.ctx.stats.tm_num, "checkpoint saved");
        Ok(())
    }
}

impl<'a, E: Evaluator, S: RecordSink> Enumerator<'a, LocalQueue, E, S> {
    /// Picks a search back up where `checkpoint` left it. The checkpoint's
    /// limits win over the ones in `settings`.
    pub fn resume(
        checkpoint: Checkpoint,
        mut settings: EnumSettings,
        evaluator: E,
        sink: S,
    ) -> Self {
        if settings.limits != checkpoint.limits {
            warn!("evaluator limits differ from the checkpoint; using the checkpoint's");
            settings.limits = checkpoint.limits;
        }
        info!(
            run_id = %checkpoint.run_id,
            tm_num = checkpoint.stats.tm_num,
            queued = checkpoint.queue.jobs.len(),
            "resuming from checkpoint"
        );
        let ctx = EnumeratorContext {
            run_id: checkpoint.run_id,
            params: checkpoint.params,
            settings,
            stats: checkpoint.stats,
            rng: checkpoint.rng,
            processed: 0,
        };
        Self::new(ctx, LocalQueue::from_snapshot(checkpoint.queue), evaluator, sink)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::error::EvalError;
    use crate::evaluator::DirectSimulator;
    use crate::record::MemorySink;

    type TestEnumerator = Enumerator<'static, LocalQueue, DirectSimulator, MemorySink>;

    fn enumerator(params: SearchParams, settings: EnumSettings) -> TestEnumerator {
        let mut e = Enumerator::new(
            EnumeratorContext::new(params, settings),
            LocalQueue::depth_first(),
            DirectSimulator,
            MemorySink::new(),
        );
        e.seed().unwrap();
        e
    }

    #[test]
    fn two_state_two_symbol_search() {
        let mut e = enumerator(SearchParams::new(2, 2), EnumSettings::default());
        let stats = e.run().unwrap();
        assert_eq!(stats.num_halt, 11);
        assert_eq!(stats.num_infinite + stats.num_unresolved, 42);
        assert_eq!(stats.num_branched, 19);
        assert_eq!(stats.tm_num, 72);
        assert_eq!(stats.best_steps, 6);
        assert_eq!(stats.best_score, 4);
        assert_eq!(stats.best_steps_table.unwrap().to_string(), "1RB1LB_1LA1RZ");
    }

    #[test]
    fn first_branch_yields_four_right_moving_children() {
        let mut e = enumerator(SearchParams::new(2, 2), EnumSettings::default());
        assert_eq!(e.step().unwrap(), StepOutcome::Processed);
        assert_eq!(e.stats().num_children, 4);
        let tables: HashSet<String> = e
            .queue()
            .snapshot()
            .jobs
            .iter()
            .map(|j| j.table.to_string())
            .collect();
        let expected: HashSet<String> =
            ["0RA---_------", "1RA---_------", "0RB---_------", "1RB---_------"]
                .into_iter()
                .map(String::from)
                .collect();
        assert_eq!(tables, expected);
    }

    #[test]
    fn forced_first_transition() {
        let params = SearchParams {
            first_1rb: true,
            ..SearchParams::new(2, 2)
        };
        let stats = enumerator(params, EnumSettings::default()).run().unwrap();
        assert_eq!(stats.num_halt, 10);
        assert_eq!(stats.best_steps, 6);
    }

    #[test]
    fn randomized_order_classifies_the_same_set() {
        let mut plain = enumerator(SearchParams::new(2, 2), EnumSettings::default());
        plain.run().unwrap();
        let params = SearchParams {
            randomize: true,
            seed: 7,
            ..SearchParams::new(2, 2)
        };
        let mut shuffled = enumerator(params, EnumSettings::default());
        shuffled.run().unwrap();

        let tables = |e: Enumerator<'static, LocalQueue, DirectSimulator, MemorySink>| {
            let (_, _, sink) = e.into_parts();
            let mut v: Vec<String> = sink.records.iter().map(|r| r.table.to_string()).collect();
            v.sort();
            v
        };
        assert_ne!(shuffled.context().rng, Some(SplitMix64::seeded(7)));
        assert_eq!(tables(plain), tables(shuffled));
    }

    #[test]
    fn budget_drains_the_rest_as_not_run() {
        let settings = EnumSettings {
            num_enum: Some(3),
            ..EnumSettings::default()
        };
        let mut e = enumerator(SearchParams::new(2, 2), settings);
        let stats = e.run().unwrap();
        assert_eq!(stats.tm_num, 3);
        assert!(stats.num_not_run > 0);
        assert_eq!(e.queue().len(), 0);
        let (_, _, sink) = e.into_parts();
        let not_run = sink
            .records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Unknown { reason: UnknownReason::NotRun, .. }))
            .count() as u64;
        assert_eq!(not_run, stats.num_not_run);
    }

    #[test]
    fn progress_callback_fires() {
        let mut calls = 0;
        {
            let settings = EnumSettings {
                progress_interval: 10,
                ..EnumSettings::default()
            };
            let mut e = Enumerator::new(
                EnumeratorContext::new(SearchParams::new(2, 2), settings),
                LocalQueue::depth_first(),
                DirectSimulator,
                MemorySink::new(),
            )
            .on_progress(|_, _| calls += 1);
            e.seed().unwrap();
            e.run().unwrap();
        }
        // 72 jobs: seven interval ticks plus the final report.
        assert_eq!(calls, 8);
    }

    struct Failing;

    impl Evaluator for Failing {
        fn evaluate(
            &mut self,
            _: &TransitionTable,
            _: &Limits,
        ) -> Result<Classification, EvalError> {
            Err(EvalError("boom".into()))
        }
    }

    #[test]
    fn evaluator_failure_names_the_table() {
        let mut e = Enumerator::new(
            EnumeratorContext::new(SearchParams::new(2, 2), EnumSettings::default()),
            LocalQueue::depth_first(),
            Failing,
            MemorySink::new(),
        );
        e.seed().unwrap();
        let err = e.run().unwrap_err();
        assert!(matches!(
            err,
            SearchError::Evaluator { ref table, .. } if table == "------_------"
        ));
    }

    #[test]
    fn params_are_validated() {
        assert!(SearchParams::new(2, 2).validate().is_ok());
        assert!(SearchParams::new(0, 2).validate().is_err());
        assert!(SearchParams::new(2, 1).validate().is_err());
        assert!(SearchParams::new(26, 2).validate().is_err());
    }

    #[test]
    fn merge_keeps_the_better_champion() {
        let mut a = EnumStats {
            num_halt: 1,
            best_steps: 6,
            best_steps_table: Some("1RB1LB_1LA1RZ".parse().unwrap()),
            ..EnumStats::default()
        };
        let b = EnumStats {
            num_halt: 2,
            best_steps: 3,
            ..EnumStats::default()
        };
        a.merge(&b);
        assert_eq!(a.num_halt, 3);
        assert_eq!(a.best_steps, 6);
    }
}

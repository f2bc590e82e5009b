//! Bounded-concurrency driver that pushes every task through every stage.
//!
//! A task holds one concurrency slot from its first stage until its pipeline
//! is terminal, so a later stage of one task never competes with the
//! admission of a new task.

use super::{PipelineState, RunReport, RunSummary, StageRunner, StageSpec};
use crate::core::{Task, TaskId};
use crate::errors::{ReaperError, StageError, TaskFailure};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::store::ResultStore;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Stage name reported for a task whose pipeline panicked.
const PANIC_STAGE: &str = "pipeline";

/// Drives queued tasks through an ordered list of stages.
///
/// `run` consumes the orchestrator, so a run can only complete once.
pub struct PipelineOrchestrator {
    stages: Arc<Vec<StageSpec>>,
    queue: VecDeque<Task>,
    store: Arc<ResultStore>,
    sink: Arc<dyn EventSink>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator for the given stages, run in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages or a stage is invalid.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, ReaperError> {
        if stages.is_empty() {
            return Err(ReaperError::Pipeline(
                "Pipeline must have at least one stage".to_string(),
            ));
        }
        for spec in &stages {
            spec.validate()?;
        }

        Ok(Self {
            stages: Arc::new(stages),
            queue: VecDeque::new(),
            store: Arc::new(ResultStore::new()),
            sink: Arc::new(NoOpEventSink),
        })
    }

    /// Sets the sink that receives task failures and the completion event.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enqueues one task.
    pub fn add_task(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Enqueues a batch of tasks.
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.queue.extend(tasks);
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the result recorded for a task so far.
    #[must_use]
    pub fn results(&self, id: &TaskId) -> Option<serde_json::Value> {
        self.store.get(id)
    }

    /// Returns the shared result store.
    #[must_use]
    pub fn store(&self) -> Arc<ResultStore> {
        self.store.clone()
    }

    /// Runs every queued task with at most `concurrency` tasks in flight.
    ///
    /// Task failures are emitted as [`PipelineEvent::TaskFailed`] and never
    /// abort the run. [`PipelineEvent::Completed`] is emitted once, after the
    /// last task settles, and the returned future resolves right after it.
    ///
    /// # Errors
    ///
    /// Returns an error if `concurrency` is zero.
    pub async fn run(mut self, concurrency: usize) -> Result<RunReport, ReaperError> {
        if concurrency == 0 {
            return Err(ReaperError::Pipeline(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        let start = Instant::now();
        let runner = StageRunner::new(self.store.clone(), self.sink.clone());
        let mut summary = RunSummary {
            run_id: Uuid::now_v7().to_string(),
            total: self.queue.len(),
            concurrency,
            ..RunSummary::default()
        };
        let mut failures = Vec::new();
        let mut remaining = summary.total;

        info!(
            run_id = %summary.run_id,
            tasks = summary.total,
            stages = self.stages.len(),
            concurrency,
            "Starting pipeline run"
        );

        let mut in_flight = JoinSet::new();
        let mut spawned = HashMap::new();
        while in_flight.len() < concurrency {
            let Some(task) = self.queue.pop_front() else { break };
            self.spawn_pipeline(&mut in_flight, &mut spawned, task, &runner, &summary.run_id);
        }
        summary.peak_in_flight = in_flight.len();

        while let Some(joined) = in_flight.join_next().await {
            let (task_id, outcome) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    let task_id = spawned
                        .remove(&e.id())
                        .unwrap_or_else(|| TaskId::from(e.id().to_string()));
                    let failure = TaskFailure::new(
                        task_id.clone(),
                        PANIC_STAGE,
                        0,
                        StageError::Panicked(e.to_string()),
                    );
                    (task_id, Err(failure))
                }
            };

            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(failure) => {
                    summary.failed += 1;
                    self.sink.emit(PipelineEvent::TaskFailed(failure.clone())).await;
                    failures.push(failure);
                }
            }
            remaining -= 1;
            debug!(task_id = %task_id, remaining, "Task settled");

            if let Some(task) = self.queue.pop_front() {
                self.spawn_pipeline(&mut in_flight, &mut spawned, task, &runner, &summary.run_id);
                summary.peak_in_flight = summary.peak_in_flight.max(in_flight.len());
            }
        }
        debug_assert_eq!(remaining, 0);

        summary.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Pipeline run complete"
        );
        self.sink.emit(PipelineEvent::Completed(summary.clone())).await;

        Ok(RunReport::new(summary, failures, self.store))
    }

    /// Spawns a task's pipeline into the run's join set.
    ///
    /// The join set aborts every pipeline still running if the run future is
    /// dropped, so no stage work outlives its run.
    fn spawn_pipeline(
        &self,
        in_flight: &mut JoinSet<(TaskId, Result<(), TaskFailure>)>,
        spawned: &mut HashMap<tokio::task::Id, TaskId>,
        task: Task,
        runner: &StageRunner,
        run_id: &str,
    ) {
        let task_id = task.id.clone();
        let span = info_span!("pipeline", run_id = %run_id, task_id = %task.id);
        let pipeline = drive_pipeline(task, self.stages.clone(), runner.clone());
        let id = task_id.clone();
        let handle = in_flight.spawn(async move { (id, pipeline.await) }.instrument(span));
        spawned.insert(handle.id(), task_id);
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("stages", &self.stage_names())
            .field("pending", &self.queue.len())
            .finish()
    }
}

/// Runs one task through every stage in order, stopping at the first
/// exhausted stage.
async fn drive_pipeline(
    task: Task,
    stages: Arc<Vec<StageSpec>>,
    runner: StageRunner,
) -> Result<(), TaskFailure> {
    let mut state = PipelineState::new();

    for (index, spec) in stages.iter().enumerate() {
        state.enter_stage(index, spec.retry.max_attempts);
        if let Err(failure) = runner.run(&task, spec, &mut state).await {
            debug!(
                task_id = %task.id,
                stage_index = state.stage_index(),
                remaining_stages = stages.len() - state.stage_index() - 1,
                "Pipeline stopped at exhausted stage"
            );
            return Err(failure);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutput;
    use crate::events::{ChannelEventSink, CollectingEventSink};
    use crate::stages::{AsyncFnStage, NoOpStage, Stage, StageContext};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn spec(stage: impl Stage + 'static) -> StageSpec {
        StageSpec::new(Arc::new(stage))
    }

    fn tasks(ids: &[&str]) -> Vec<Task> {
        ids.iter().map(|id| Task::new(*id)).collect()
    }

    #[test]
    fn test_requires_a_stage() {
        assert!(PipelineOrchestrator::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let orchestrator = PipelineOrchestrator::new(vec![spec(NoOpStage::new("noop"))]).unwrap();
        assert!(orchestrator.run(0).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_run_completes_once() {
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = PipelineOrchestrator::new(vec![spec(NoOpStage::new("noop"))])
            .unwrap()
            .with_event_sink(sink.clone());

        let report = orchestrator.run(4).await.unwrap();

        assert_eq!(report.summary.total, 0);
        assert_eq!(sink.events_of_type("run.completed").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_in_flight_never_exceed_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (active.clone(), peak.clone());
        let admit = AsyncFnStage::new("admit", move |_task, _ctx| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(StageOutput::Empty)
            }
        });
        let a = active.clone();
        let release = AsyncFnStage::new("release", move |task: Task, _ctx| {
            let active = a.clone();
            async move {
                let jitter = task.id.as_str().len() as u64;
                tokio::time::sleep(Duration::from_millis(10 * jitter)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(StageOutput::Empty)
            }
        });

        let mut orchestrator = PipelineOrchestrator::new(vec![spec(admit), spec(release)]).unwrap();
        orchestrator.add_tasks(tasks(&["a", "bb", "ccc", "d", "ee", "fff", "g", "hh", "iii", "j"]));

        let report = orchestrator.run(3).await.unwrap();

        assert_eq!(report.summary.succeeded, 10);
        assert_eq!(report.summary.peak_in_flight, 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_held_across_stages() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let first = AsyncFnStage::new("first", move |task: Task, _ctx| {
            let order = o.clone();
            async move {
                order.lock().push(format!("{}:first", task.id));
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(StageOutput::Empty)
            }
        });
        let o = order.clone();
        let second = AsyncFnStage::new("second", move |task: Task, _ctx| {
            let order = o.clone();
            async move {
                order.lock().push(format!("{}:second", task.id));
                Ok(StageOutput::Empty)
            }
        });

        let mut orchestrator = PipelineOrchestrator::new(vec![spec(first), spec(second)]).unwrap();
        orchestrator.add_tasks(tasks(&["a", "b"]));
        orchestrator.run(1).await.unwrap();

        assert_eq!(
            *order.lock(),
            vec!["a:first", "a:second", "b:first", "b:second"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_stage_skips_later_stages() {
        let second_calls = Arc::new(AtomicUsize::new(0));
        let failing = AsyncFnStage::new("details", |task: Task, _ctx| async move {
            if task.id.as_str() == "bad" {
                Err(StageError::rejected("404"))
            } else {
                Ok(StageOutput::result(json!({"ok": true})))
            }
        });
        let calls = second_calls.clone();
        let second = AsyncFnStage::new("remove", move |_task, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(StageOutput::Empty)
            }
        });

        let (sink, mut rx) = ChannelEventSink::new();
        let mut orchestrator =
            PipelineOrchestrator::new(vec![spec(failing).with_max_attempts(2), spec(second)])
                .unwrap()
                .with_event_sink(Arc::new(sink));
        orchestrator.add_tasks(tasks(&["good", "bad"]));

        let report = orchestrator.run(2).await.unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.failures[0].task_id, TaskId::from("bad"));
        assert_eq!(report.failures[0].attempts, 2);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let task_failures = events.iter().filter(|e| e.event_type() == "task.failed").count();
        let completions = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(task_failures, 1);
        assert_eq!(completions, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_later_stage_reads_earlier_result() {
        let fetch = AsyncFnStage::new("fetch", |task: Task, _ctx| async move {
            Ok(StageOutput::result(json!({"host": format!("{}.now.sh", task.id)})))
        });
        let tag = AsyncFnStage::new("tag", |task: Task, ctx: StageContext| async move {
            let details = ctx.results(&task.id).unwrap_or_default();
            Ok(StageOutput::aggregate("hosts", details["host"].clone()))
        });

        let mut orchestrator = PipelineOrchestrator::new(vec![spec(fetch), spec(tag)]).unwrap();
        orchestrator.add_tasks(tasks(&["a", "b"]));
        let report = orchestrator.run(2).await.unwrap();

        let hosts = report.bucket("hosts");
        assert_eq!(hosts.get(&TaskId::from("a")), Some(&json!("a.now.sh")));
        assert_eq!(hosts.get(&TaskId::from("b")), Some(&json!("b.now.sh")));
        assert_eq!(report.results(&TaskId::from("a")).unwrap()["host"], "a.now.sh");
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let stage = AsyncFnStage::new("explode", |task: Task, _ctx| async move {
            assert_ne!(task.id.as_str(), "boom", "stage exploded");
            Ok(StageOutput::Empty)
        });

        let sink = Arc::new(CollectingEventSink::new());
        let mut orchestrator = PipelineOrchestrator::new(vec![spec(stage)])
            .unwrap()
            .with_event_sink(sink.clone());
        orchestrator.add_tasks(tasks(&["ok", "boom", "fine"]));

        let report = orchestrator.run(2).await.unwrap();

        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(matches!(report.failures[0].error, StageError::Panicked(_)));
        assert_eq!(report.failures[0].task_id, TaskId::from("boom"));
        assert_eq!(report.failures[0].stage, PANIC_STAGE);
        assert_eq!(sink.events_of_type("run.completed").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_pipelines() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (started.clone(), finished.clone());
        let slow = AsyncFnStage::new("remove", move |_task, _ctx| {
            let (started, finished) = (s.clone(), f.clone());
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(StageOutput::Empty)
            }
        });

        let sink = Arc::new(CollectingEventSink::new());
        let mut orchestrator = PipelineOrchestrator::new(vec![spec(slow).with_timeout_ms(10_000)])
            .unwrap()
            .with_event_sink(sink.clone());
        orchestrator.add_tasks(tasks(&["a", "b", "c"]));

        let cut_short = tokio::time::timeout(Duration::from_millis(100), orchestrator.run(2)).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(sink.events_of_type("run.completed").is_empty());
    }

    #[test]
    fn test_pending_and_stage_names() {
        let mut orchestrator = PipelineOrchestrator::new(vec![
            spec(NoOpStage::new("details")),
            spec(NoOpStage::new("remove")),
        ])
        .unwrap();
        orchestrator.add_task(Task::new("a"));
        orchestrator.add_tasks(tasks(&["b", "c"]));

        assert_eq!(orchestrator.pending(), 3);
        assert_eq!(orchestrator.stage_names(), vec!["details", "remove"]);
        assert!(orchestrator.results(&TaskId::from("a")).is_none());
    }
}

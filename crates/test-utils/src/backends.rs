use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use relbuild::dag::Task;
use relbuild::errors::Result;
use relbuild::exec::{BuildPlan, SchedulerBackend, SchedulerExit, ShimOutcome, TaskContext, TaskShim};
use relbuild::ipc::{SocketNotifier, StatusMessage, StatusSink};

/// A scheduler that runs every task in-process, one at a time, in graph
/// order, through the real shim and a real socket notifier.
///
/// Records each task id with its shim outcome. A shim error ends the run
/// like a failing recipe ends `make`.
#[derive(Default)]
pub struct SequentialBackend {
    pub executed: Arc<Mutex<Vec<(String, ShimOutcome)>>>,
}

impl SequentialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<(String, ShimOutcome)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn outcome_of(&self, task: &str) -> Option<ShimOutcome> {
        self.outcomes()
            .into_iter()
            .find(|(id, _)| id == task)
            .map(|(_, o)| o)
    }
}

impl SchedulerBackend for SequentialBackend {
    fn run<'a>(
        &'a mut self,
        plan: BuildPlan<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<SchedulerExit>> + Send + 'a>> {
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            let notifier = SocketNotifier::new(plan.socket);
            let shim = TaskShim::new(&notifier);
            let marker = plan.layout.marker();

            for task in plan.graph.tasks() {
                let ctx = TaskContext {
                    task: plan.graph.describe(task),
                    log: task.log.clone(),
                    marker: marker.clone(),
                    token: plan.token.to_string(),
                };
                match shim.run(&ctx, task).await {
                    Ok(outcome) => executed.lock().unwrap().push((task.id.clone(), outcome)),
                    Err(_) => return Ok(SchedulerExit::failed(Some(2))),
                }
            }
            Ok(SchedulerExit::ok())
        })
    }
}

/// A scheduler that starts every task as soon as its dependencies have
/// ended, with no limit on concurrency, like `make -j` without a number.
///
/// Each task runs in its own tokio task with its own socket notifier, the
/// way separate shim processes would.
#[derive(Default)]
pub struct ConcurrentBackend {
    pub executed: Arc<Mutex<Vec<(String, ShimOutcome)>>>,
}

impl ConcurrentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<(String, ShimOutcome)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn outcome_of(&self, task: &str) -> Option<ShimOutcome> {
        self.outcomes()
            .into_iter()
            .find(|(id, _)| id == task)
            .map(|(_, o)| o)
    }
}

impl SchedulerBackend for ConcurrentBackend {
    fn run<'a>(
        &'a mut self,
        plan: BuildPlan<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<SchedulerExit>> + Send + 'a>> {
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            let mut done: BTreeSet<String> = BTreeSet::new();
            let mut started: BTreeSet<String> = BTreeSet::new();
            let mut running = tokio::task::JoinSet::new();
            let mut ok = true;

            loop {
                let ready: Vec<&Task> = plan
                    .graph
                    .tasks()
                    .filter(|t| !started.contains(&t.id))
                    .filter(|t| t.deps.iter().all(|d| done.contains(d)))
                    .collect();

                for task in ready {
                    started.insert(task.id.clone());
                    let ctx = TaskContext {
                        task: plan.graph.describe(task),
                        log: task.log.clone(),
                        marker: plan.layout.marker(),
                        token: plan.token.to_string(),
                    };
                    let socket = plan.socket.to_path_buf();
                    let task = task.clone();
                    running.spawn(async move {
                        let notifier = SocketNotifier::new(socket);
                        let outcome = TaskShim::new(&notifier).run(&ctx, &task).await;
                        (task.id, outcome)
                    });
                }

                let Some(joined) = running.join_next().await else {
                    break;
                };
                let (id, outcome) = joined.map_err(anyhow::Error::from)?;
                match outcome {
                    Ok(outcome) => executed.lock().unwrap().push((id.clone(), outcome)),
                    // A failing recipe: make finishes what runs, starts nothing new.
                    Err(_) => ok = false,
                }
                if ok {
                    done.insert(id);
                }
            }

            Ok(if ok {
                SchedulerExit::ok()
            } else {
                SchedulerExit::failed(Some(2))
            })
        })
    }
}

/// A status sink that keeps every message in memory.
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub messages: Arc<Mutex<Vec<StatusMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<StatusMessage> {
        self.messages()
            .into_iter()
            .filter(StatusMessage::is_failure)
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn send(&self, msg: StatusMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let messages = Arc::clone(&self.messages);
        Box::pin(async move {
            messages.lock().unwrap().push(msg);
            Ok(())
        })
    }
}

/// A status sink whose every send fails, like an unreachable controller.
#[derive(Default, Clone, Copy)]
pub struct UnreachableSink;

impl StatusSink for UnreachableSink {
    fn send(&self, _msg: StatusMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Err(anyhow::anyhow!("controller unreachable").into()) })
    }
}

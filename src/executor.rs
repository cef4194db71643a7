//! The cooperative executor: the only code that touches the scene.
//!
//! [`ExecutorHandle::spawn`] starts the `scene-executor` thread. The
//! [`Scene`] is created on that thread and never leaves it (`Scene` is
//! `!Send`). The thread drives a current-thread tokio runtime whose interval
//! timer wakes [`Executor::tick`], which drains at most one task per tick.
//!
//! Nothing a task does can stop the loop: handler errors and script errors
//! become response values, and panics inside handlers or scripts are caught
//! and reported the same way.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::queue::{Delivery, ResponseQueue, TaskQueue};
use crate::registry::CapabilityRegistry;
use crate::sanitizer::SanitizedScript;
use crate::scene::{ExportFormat, Scene};
use crate::script::Interpreter;
use crate::types::{
    ExecutionResponse, OperationBatch, OperationResult, TaskId, TaskKind, TaskResponse,
};

/// Stack for the executor thread. The interpreter recurses once per
/// expression level, up to [`crate::script::MAX_EXPR_DEPTH`].
const EXECUTOR_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The task queue was empty.
    Idle,
    /// One task ran and its response was pushed.
    Processed(TaskId),
}

/// Drains the task queue against a scene.
pub struct Executor {
    scene: Scene,
    registry: Arc<CapabilityRegistry>,
    tasks: Arc<TaskQueue>,
    responses: Arc<ResponseQueue>,
}

impl Executor {
    pub fn new(
        scene: Scene,
        registry: Arc<CapabilityRegistry>,
        tasks: Arc<TaskQueue>,
        responses: Arc<ResponseQueue>,
    ) -> Self {
        Self {
            scene,
            registry,
            tasks,
            responses,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Pop and run at most one task. Returns immediately on an empty queue.
    pub fn tick(&mut self) -> Tick {
        let Some(task) = self.tasks.try_pop() else {
            return Tick::Idle;
        };
        let label = task.label();
        let waited = Utc::now() - task.submitted_at();
        let (id, kind) = task.into_parts();
        debug!(
            target: "bridge.executor",
            task_id = %id,
            kind = label,
            queued_ms = waited.num_milliseconds(),
            "task started"
        );

        let started = Instant::now();
        let response = match kind {
            TaskKind::OperationBatch(batch) => TaskResponse::Batch(self.run_batch(&batch)),
            TaskKind::RawCode(script) => TaskResponse::Script(self.run_script(&script)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match self.responses.push(id, response) {
            Delivery::Delivered => {
                info!(
                    target: "bridge.executor",
                    task_id = %id,
                    kind = label,
                    elapsed_ms,
                    "task finished"
                );
            },
            Delivery::Discarded => {
                warn!(
                    target: "bridge.executor",
                    task_id = %id,
                    kind = label,
                    elapsed_ms,
                    "caller gave up before the task finished; response discarded"
                );
            },
        }
        Tick::Processed(id)
    }

    /// Run every operation in order. A failing item never stops the batch.
    pub fn run_batch(&mut self, batch: &OperationBatch) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(batch.len());
        for operation in &batch.operations {
            let Some(capability) = self.registry.get(&operation.op) else {
                warn!(target: "bridge.executor", op = %operation.op, "unsupported op");
                results.push(OperationResult::unsupported(&operation.op));
                continue;
            };
            let scene = &mut self.scene;
            let outcome =
                catch_unwind(AssertUnwindSafe(|| capability.invoke(scene, &operation.params)));
            let result = match outcome {
                Ok(Ok(value)) => OperationResult::ok(&operation.op, value),
                Ok(Err(err)) => {
                    warn!(
                        target: "bridge.executor",
                        op = %operation.op,
                        error = %err,
                        "operation failed"
                    );
                    OperationResult::error(&operation.op, err.to_string())
                },
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        target: "bridge.executor",
                        op = %operation.op,
                        %message,
                        "operation panicked"
                    );
                    OperationResult::error(&operation.op, format!("handler panicked: {message}"))
                },
            };
            results.push(result);
        }
        results
    }

    /// Run a sanitized script, then produce its preview and model exports.
    pub fn run_script(&mut self, script: &SanitizedScript) -> ExecutionResponse {
        let registry = Arc::clone(&self.registry);
        let scene = &mut self.scene;
        let run = catch_unwind(AssertUnwindSafe(|| {
            Interpreter::new(scene, &registry).run(script.program())
        }));
        let outcome = match run {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(target: "bridge.executor", error = %err, "script failed");
                return ExecutionResponse::failed(err.to_string());
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target: "bridge.executor", %message, "script panicked");
                return ExecutionResponse::failed(format!("script panicked: {message}"));
            },
        };

        let stamp = Utc::now().timestamp_millis();
        let preview = match outcome.latest_preview() {
            Some(path) => path.clone(),
            None => match self.scene.render_preview(&format!("preview_{stamp}.svg")) {
                Ok(path) => path,
                Err(err) => {
                    error!(target: "bridge.executor", error = %err, "preview rendering failed");
                    return ExecutionResponse::failed(format!("preview failed: {err}"));
                },
            },
        };

        let mut exported = Vec::with_capacity(ExportFormat::ALL.len());
        for format in ExportFormat::ALL {
            let filename = format!("model_{stamp}.{}", format.extension());
            match self.scene.export_as(&filename, format) {
                Ok(path) => exported.push(file_name(&path)),
                Err(err) => {
                    warn!(
                        target: "bridge.executor",
                        file = %filename,
                        error = %err,
                        "export failed, skipping"
                    );
                },
            }
        }

        ExecutionResponse::ok(file_name(&preview), exported)
    }

    /// Tick on `period` until `cancel` fires.
    pub async fn run(&mut self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "bridge.executor", period_ms = period.as_millis() as u64, "executor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                },
            }
        }
        info!(target: "bridge.executor", "executor stopped");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Settings for the executor thread.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub tick_interval: Duration,
    pub output_dir: PathBuf,
    pub preview_size: u32,
}

impl From<&BridgeConfig> for ExecutorConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            output_dir: config.output_dir.clone(),
            preview_size: config.preview_size(),
        }
    }
}

/// Owner of the running executor thread.
#[derive(Debug)]
pub struct ExecutorHandle {
    cancel: CancellationToken,
    exited: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

/// Fires `exited` however the thread ends, including by panic. No response
/// can arrive after that, so abandoned ids are released first.
struct ExitGuard {
    exited: CancellationToken,
    cancel: CancellationToken,
    responses: Arc<ResponseQueue>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            error!(target: "bridge.executor", "executor thread exited unexpectedly");
        }
        let pruned = self.responses.prune_abandoned();
        if pruned > 0 {
            debug!(target: "bridge.executor", pruned, "released abandoned task ids");
        }
        self.exited.cancel();
    }
}

impl ExecutorHandle {
    /// Start the `scene-executor` thread.
    pub fn spawn(
        config: ExecutorConfig,
        registry: Arc<CapabilityRegistry>,
        tasks: Arc<TaskQueue>,
        responses: Arc<ResponseQueue>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let exited = CancellationToken::new();
        let guard = ExitGuard {
            exited: exited.clone(),
            cancel: cancel.clone(),
            responses: Arc::clone(&responses),
        };
        let token = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("scene-executor".into())
            .stack_size(EXECUTOR_STACK_SIZE)
            .spawn(move || {
                let _guard = guard;
                let built = tokio::runtime::Builder::new_current_thread().enable_time().build();
                let runtime = match built {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(
                            target: "bridge.executor",
                            error = %err,
                            "failed to build executor runtime"
                        );
                        return;
                    },
                };
                let scene = Scene::new(config.output_dir, config.preview_size);
                let mut executor = Executor::new(scene, registry, tasks, responses);
                runtime.block_on(executor.run(config.tick_interval, token));
            })?;

        Ok(Self {
            cancel,
            exited,
            thread: Some(thread),
        })
    }

    /// Whether the thread is still running.
    pub fn is_running(&self) -> bool {
        !self.exited.is_cancelled()
    }

    /// A token that fires when the thread ends for any reason.
    pub fn exit_token(&self) -> CancellationToken {
        self.exited.clone()
    }

    /// Stop the loop after the current tick and wait for the thread.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(target: "bridge.executor", "executor thread panicked");
            }
        }
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

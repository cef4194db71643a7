//! The RPC gateway: what every transport calls into.
//!
//! Each call that needs the scene becomes a [`Task`] on the task queue. The
//! calling future then sleep-polls the response queue for its own task id
//! until the response arrives or the per-call deadline passes. Timed-out
//! tasks are not retracted; their id is abandoned so the late response is
//! dropped on arrival.
//!
//! Script text is sanitized here, before anything is queued, and every
//! script call updates the [`GenerationTracker`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::queue::{ResponseQueue, TaskQueue};
use crate::registry::{CapabilityInfo, CapabilityRegistry};
use crate::sanitizer::Sanitizer;
use crate::script::strip_code_fences;
use crate::tracker::GenerationTracker;
use crate::types::{
    CallOutcome, ExecutionResponse, GenerationState, OperationBatch, OperationResult, Task, TaskId,
    TaskResponse,
};

/// Gateway timing and input handling.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub poll_interval: Duration,
    pub batch_timeout: Duration,
    pub script_timeout: Duration,
    pub strip_code_fences: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for GatewayConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            batch_timeout: config.batch_timeout(),
            script_timeout: config.script_timeout(),
            strip_code_fences: config.strip_code_fences,
        }
    }
}

/// Reply to `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pong {
    pub status: &'static str,
    pub info: &'static str,
}

/// Front end shared by all transports. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Gateway {
    tasks: Arc<TaskQueue>,
    responses: Arc<ResponseQueue>,
    registry: Arc<CapabilityRegistry>,
    tracker: Arc<GenerationTracker>,
    sanitizer: Sanitizer,
    config: GatewayConfig,
    executor_exited: Option<CancellationToken>,
}

impl Gateway {
    pub fn new(
        tasks: Arc<TaskQueue>,
        responses: Arc<ResponseQueue>,
        registry: Arc<CapabilityRegistry>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            tasks,
            responses,
            registry,
            tracker: Arc::new(GenerationTracker::new()),
            sanitizer: Sanitizer::default(),
            config,
            executor_exited: None,
        }
    }

    /// Fail calls fast once `exited` fires instead of waiting out the deadline.
    pub fn with_executor_liveness(mut self, exited: CancellationToken) -> Self {
        self.executor_exited = Some(exited);
        self
    }

    pub fn tracker(&self) -> &GenerationTracker {
        &self.tracker
    }

    pub fn ping(&self) -> Pong {
        Pong {
            status: "ok",
            info: "scene bridge alive",
        }
    }

    /// Queue a batch and wait for its per-operation results.
    pub async fn process_operations(
        &self,
        batch: OperationBatch,
    ) -> Result<CallOutcome<Vec<OperationResult>>> {
        self.ensure_executor()?;
        let operations = batch.len();
        let task = Task::operations(batch);
        let id = task.id();
        debug!(target: "bridge.gateway", task_id = %id, operations, "queueing batch");
        self.tasks.push(task);

        match self.wait_for(id, self.config.batch_timeout).await? {
            None => Ok(CallOutcome::TimedOut),
            Some(TaskResponse::Batch(results)) => Ok(CallOutcome::Completed(results)),
            Some(TaskResponse::Script(_)) => Err(BridgeError::UnexpectedResponse { task_id: id }),
        }
    }

    /// Sanitize, queue and wait for a script.
    ///
    /// A sanitizer rejection returns [`BridgeError::Rejected`] and nothing is
    /// queued.
    pub async fn process_script(&self, code: &str) -> Result<CallOutcome<ExecutionResponse>> {
        let code = if self.config.strip_code_fences {
            strip_code_fences(code)
        } else {
            code.to_string()
        };

        let script = match self.sanitizer.validate(&code) {
            Ok(script) => script,
            Err(rejection) => {
                warn!(target: "bridge.gateway", reason = rejection.reason(), "script rejected");
                self.tracker.mark_error(rejection.reason());
                return Err(rejection.into());
            },
        };

        if let Err(err) = self.ensure_executor() {
            self.tracker.mark_error(err.to_string());
            return Err(err);
        }

        let task = Task::script(script);
        let id = task.id();
        self.tracker.mark_running();
        info!(target: "bridge.gateway", task_id = %id, bytes = code.len(), "queueing script");
        self.tasks.push(task);

        let response = match self.wait_for(id, self.config.script_timeout).await {
            Ok(response) => response,
            Err(err) => {
                self.tracker.mark_error(err.to_string());
                return Err(err);
            },
        };

        match response {
            None => {
                self.tracker.mark_error("timeout");
                Ok(CallOutcome::TimedOut)
            },
            Some(TaskResponse::Script(response)) => {
                self.record(&response);
                Ok(CallOutcome::Completed(response))
            },
            Some(TaskResponse::Batch(_)) => {
                let err = BridgeError::UnexpectedResponse { task_id: id };
                self.tracker.mark_error(err.to_string());
                Err(err)
            },
        }
    }

    pub fn generation_status(&self) -> GenerationState {
        self.tracker.snapshot()
    }

    pub fn list_capabilities(&self) -> Vec<CapabilityInfo> {
        self.registry.describe()
    }

    fn record(&self, response: &ExecutionResponse) {
        match (&response.artifact, response.is_ok()) {
            (Some(artifact), true) => {
                let exported = response.exported_artifacts.clone().unwrap_or_default();
                self.tracker.mark_done(artifact.clone(), exported);
            },
            (None, true) => self.tracker.mark_error("script finished without a preview"),
            (_, false) => self
                .tracker
                .mark_error(response.error.clone().unwrap_or_else(|| "script failed".to_string())),
        }
    }

    fn executor_stopped(&self) -> bool {
        self.executor_exited
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn ensure_executor(&self) -> Result<()> {
        if self.executor_stopped() {
            return Err(BridgeError::ExecutorStopped);
        }
        Ok(())
    }

    /// Poll for `id` until `timeout`. `Ok(None)` means the deadline passed
    /// and the id was abandoned.
    async fn wait_for(&self, id: TaskId, timeout: Duration) -> Result<Option<TaskResponse>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(response) = self.responses.try_take(id) {
                return Ok(Some(response));
            }
            if self.executor_stopped() {
                self.responses.forget(id);
                return Err(BridgeError::ExecutorStopped);
            }
            let now = Instant::now();
            if now >= deadline {
                self.responses.abandon(id);
                warn!(
                    target: "bridge.gateway",
                    task_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out waiting for executor"
                );
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }
}

//! Wiring: builds the queues, starts the executor thread and hands out the
//! gateway.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::executor::{ExecutorConfig, ExecutorHandle};
use crate::gateway::{Gateway, GatewayConfig};
use crate::queue::{ResponseQueue, TaskQueue};
use crate::registry::CapabilityRegistry;
use crate::server::RpcHandler;

/// A running bridge.
///
/// # Examples
///
/// ```no_run
/// use scene_bridge::{Bridge, BridgeConfig};
/// use scene_bridge::types::{Operation, OperationBatch};
/// use serde_json::json;
///
/// # async fn demo() -> scene_bridge::Result<()> {
/// let bridge = Bridge::start(BridgeConfig::default())?;
/// let batch = OperationBatch::new(vec![Operation::new("add_box", json!({"name": "B1"}))]);
/// let outcome = bridge.gateway().process_operations(batch).await?;
/// assert!(!outcome.is_timed_out());
/// bridge.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bridge {
    config: BridgeConfig,
    gateway: Gateway,
    executor: ExecutorHandle,
}

impl Bridge {
    /// Start with the builtin capabilities.
    pub fn start(config: BridgeConfig) -> Result<Self> {
        Self::with_registry(config, CapabilityRegistry::builtin())
    }

    /// Start with a custom capability table.
    pub fn with_registry(config: BridgeConfig, registry: CapabilityRegistry) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)?;

        let registry = Arc::new(registry);
        let tasks = Arc::new(TaskQueue::new());
        let responses = Arc::new(ResponseQueue::new());

        let executor = ExecutorHandle::spawn(
            ExecutorConfig::from(&config),
            Arc::clone(&registry),
            Arc::clone(&tasks),
            Arc::clone(&responses),
        )?;
        let gateway =
            Gateway::new(tasks, responses, Arc::clone(&registry), GatewayConfig::from(&config))
                .with_executor_liveness(executor.exit_token());

        info!(
            target: "bridge",
            output_dir = %config.output_dir.display(),
            capabilities = registry.len(),
            tick_ms = config.tick_interval_ms,
            "bridge started"
        );

        Ok(Self {
            config,
            gateway,
            executor,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// A JSON-RPC handler over this bridge's gateway.
    pub fn handler(&self) -> Arc<RpcHandler> {
        Arc::new(RpcHandler::new(self.gateway.clone()))
    }

    /// Fires if the executor thread ends.
    pub fn executor_exited(&self) -> CancellationToken {
        self.executor.exit_token()
    }

    /// Stop the executor after its current tick.
    pub fn shutdown(self) {
        info!(target: "bridge", "shutting down");
        self.executor.shutdown();
    }
}

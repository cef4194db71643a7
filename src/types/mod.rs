//! Wire and domain types shared by the gateway and the executor.

pub mod jsonrpc;
pub mod response;
pub mod state;
pub mod task;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponsePayload};
pub use response::{
    CallOutcome, ExecutionResponse, OpOutcome, OperationResult, ResponseStatus, TaskResponse,
    UNSUPPORTED_OP,
};
pub use state::{GenerationState, GenerationStatus};
pub use task::{Operation, OperationBatch, Params, Task, TaskId, TaskKind};

//! Workflow graph compilation and execution-input resolution for chainflow.
//!
//! This crate provides:
//!
//! - **Catalog**: Derives ports and default config from a node's category and label
//! - **Graph Model**: Nodes, typed ports and connections with referential checks
//! - **Compiler**: Turns an editable graph into the persisted, runnable form
//! - **Resolver**: Finds missing required inputs and builds per-node input maps
//! - **Execution**: State machine around collecting inputs and calling the runner
//! - **Store**: The persistence seam and the single save path

pub mod catalog;
pub mod compiler;
pub mod connection;
pub mod definition;
pub mod error;
pub mod execution;
pub mod graph;
pub mod node;
pub mod port;
pub mod resolver;
pub mod store;

pub use catalog::{NodeTemplate, derive_default_config, derive_inputs, derive_outputs};
pub use compiler::{CompiledNode, CompiledWorkflow, Compiler, CompilerConfig, NodeKind, compile};
pub use connection::{Connection, ConnectionId};
pub use definition::{Activation, ScheduleType, Workflow, WorkflowMetadata, WorkflowStatus};
pub use error::{
    ActivationError, CompileError, ExecutionError, GraphError, ResolveError, StoreError,
};
pub use execution::{
    ExecutionPhase, ExecutionRequest, ExecutionSession, ExecutionStep, FieldError,
    InputCollector, RunOutcome, RunRequest, RunStatus, RunnerError, WorkflowRunner,
    run_interactive,
};
pub use graph::{GraphEdit, WorkflowGraph};
pub use node::{Node, NodeCategory, NodeId, Parameters, Position};
pub use port::{Port, PortDirection, PortType};
pub use resolver::{
    CollectedValues, InputMap, MissingInput, find_missing_required_inputs, resolve,
};
pub use store::{
    InMemoryWorkflowStore, SaveRequest, StoredWorkflow, WorkflowStore, load_workflow,
    save_workflow,
};

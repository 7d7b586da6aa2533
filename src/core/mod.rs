//! 核心编排层：错误、状态、安全上限、进程登记、运行上下文、状态发布、关闭与编排器

pub mod builder;
pub mod context;
pub mod error;
pub mod governor;
pub mod orchestrator;
pub mod process;
pub mod publisher;
pub mod shutdown;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use context::RunContext;
pub use error::{ActionError, LimitExceeded, PlanningError};
pub use governor::SafetyGovernor;
pub use orchestrator::Orchestrator;
pub use process::{CommandOutput, ProcessLauncher, ProcessRegistry};
pub use publisher::{read_state, FileStatePublisher, MemoryPublisher, NoopPublisher, StatePublisher};
pub use shutdown::{
    IdleStatusCleanup, ProcessCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
pub use state::{
    ExecutionRecord, RecordEntry, RunOutcome, RunState, RunStatus, StatusPhase, StatusSnapshot,
    Work,
};

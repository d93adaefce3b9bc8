pub mod degradation;
pub mod idempotency;
pub mod shared_memory;
pub mod workflow_service;

pub use degradation::{DegradationController, DegradationMode};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore, SqlIdempotencyStore, resolve_idempotency};
pub use shared_memory::SharedMemory;
pub use workflow_service::{WorkflowService, WorkflowStepRunner, WorkflowStore};

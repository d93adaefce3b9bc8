pub mod session_service;
pub mod ttl_worker;
pub mod workflow_runner;

pub use session_service::SessionService;
pub use ttl_worker::TtlWorker;
pub use workflow_runner::SessionWorkflowRunner;

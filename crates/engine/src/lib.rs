//! Job lifecycle engine: submission, poll scheduling, and the in-memory
//! job registry behind the inbound API.

pub mod clock;
pub mod orchestrator;
pub mod scheduler;
pub mod service;

pub use clock::{Clock, TokioClock};
pub use orchestrator::{JobOrchestrator, PendingJob, RunContext, Submission};
pub use scheduler::{PollScheduler, PollTick};
pub use service::{JobService, ServiceError, Submitted};

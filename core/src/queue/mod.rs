mod breaker;
mod job_queue;
mod processor;

pub use breaker::{AiCircuitBreaker, BreakerState, BreakerTransition};
pub use job_queue::{EnqueueOutcome, JobQueue, QueueControl, QueueStats, SharedQueue, SkipReason};
pub use processor::{DrainReport, JobResult, ProcessorDeps, QueueProcessor};

//! Per-kind priority job queues.
//!
//! This crate provides:
//! - The `JobTransport` seam (submit, claim, complete, fail, close)
//! - A Redis transport on sorted sets with delayed retries and dead letters
//! - An in-memory transport with the same semantics

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_transport;
pub mod transport;

pub use config::{QueueBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryTransport;
pub use redis_transport::RedisTransport;
pub use transport::{ClaimedJob, DeadLetter, FailureDisposition, JobTransport, PRIORITY_SCALE};

//! Infrastructure concerns: telemetry bootstrap and the in-memory backend.

mod error;
pub mod memory;
pub mod telemetry;

pub use error::InfraError;
pub use memory::MemoryBackend;

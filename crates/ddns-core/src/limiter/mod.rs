// # Abuse Limiter Implementations

pub mod memory;

pub use memory::MemoryLimiter;

//! Durable routing state: forward mappings and chat recency.

pub mod json_file;
pub mod memory;
pub mod port;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use port::Storage;

pub mod config;
pub mod cursor;
pub mod error;
pub mod insert;
pub mod memory;

pub use config::BridgeConfig;
pub use cursor::{ResultCursor, Response, collect_batches};
pub use error::EngineError;
pub use insert::{InsertOptions, InsertSession};
pub use memory::MemoryTransport;

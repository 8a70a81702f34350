pub mod error;
pub mod http;
pub mod memory;

pub use error::{IngressError, IngressResult};
pub use http::{router, AppState};
pub use memory::{spawn_snapshot_sync, MemoryWriter};

pub mod storage;
pub mod time;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use time::{Clock, SystemClock};

pub mod config;
pub mod logging;

pub mod chunk_store;
pub mod control;
pub mod engine;
pub mod fetch_head;
pub mod finalizer;
pub mod progress;
pub mod retry;
pub mod safe_resume;

pub use chunk_store::{ChunkStore, FileMeta, MemoryChunkStore, SqliteChunkStore, StoreError};
pub use engine::{DownloadEngine, EngineConfig, TransferEvent, TransferState};
pub use finalizer::{Deliver, DirectoryDelivery};
pub use progress::ProgressSnapshot;

pub mod comparator;
pub mod engine;
pub mod event;
pub mod pool;
pub mod transfer;

pub use comparator::{
    ChildClass, Classification, CompareConfig, ComparisonError, DirectoryComparator,
    LevelComparator,
};
pub use engine::{SyncEngine, SyncError, SyncReport};
pub use event::{LogSink, MemorySink, SyncEvent, SyncEventKind, TracingSink};
pub use pool::{ImmediatePool, Job, PendingTask, TaskPool, WorkerPool};
pub use transfer::{CopyError, CopyOutcome, CopyTask};

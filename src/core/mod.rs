pub mod comparator;
pub mod engine;
pub mod executor;
pub mod inventory;
pub mod scanner;
pub mod snapshot;

pub use comparator::{FileComparator, SyncOperation};
pub use engine::{PassReport, SyncEngine};
pub use executor::{ExecuteError, OperationExecutor};
pub use inventory::{FileMeta, Inventory};
pub use scanner::FileScanner;
pub use snapshot::InventorySnapshot;

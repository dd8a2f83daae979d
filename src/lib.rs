pub mod config;
pub mod core;
pub mod logging;

pub use config::SyncSettings;
pub use core::{
    FileComparator, FileMeta, FileScanner, Inventory, OperationExecutor, PassReport, SyncEngine,
    SyncOperation,
};

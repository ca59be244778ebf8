//! Backup subsystem.
//!
//! # Data Flow
//! ```text
//! create_backup:
//!     database.rs (dump) → compression.rs → encryption.rs
//!     → checksum.rs → metadata.rs (sidecar)
//!
//! restore_backup:
//!     metadata.rs → checksum.rs (gate) → encryption.rs → compression.rs
//!     → database.rs (restore)
//!
//! scheduler.rs:
//!     interval tick → database breaker → create_backup → cleanup_old_backups
//! ```
//!
//! # Design Decisions
//! - One directory, flat layout: `<id>.sql[.gz][.enc]` next to `<id>.metadata.json`
//! - The database programs sit behind a trait so tests never need a server
//! - Intermediate files are guarded and removed on every exit path

pub mod checksum;
pub mod compression;
pub mod database;
pub mod encryption;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod scheduler;
pub mod scratch;

pub use database::{CommandTool, DatabaseTool};
pub use error::{BackupError, BackupResult};
pub use manager::{BackupManager, CleanupReport};
pub use metadata::BackupMetadata;
pub use scheduler::{BackupScheduler, DATABASE_BREAKER};

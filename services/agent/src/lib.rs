//! Filesync Agent
//!
//! Periodic file-sync agent. On every tick it checks the watched directory
//! for a readiness marker, picks the newest matching data file, fingerprints
//! its content, and uploads it to a remote HTTP endpoint unless that exact
//! content was already delivered.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐
//!            │  Scheduler   │  every poll interval, single-flight
//!            └──────┬───────┘
//!                   ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Signal Gate  │─▶│ File         │─▶│ Fingerprint  │─▶│ Dedup Store  │
//! │ (READY?)     │  │ Selector     │  │ (SHA-256)    │  │ (compare)    │
//! └──────────────┘  └──────────────┘  └──────────────┘  └──────┬───────┘
//!                                                              ▼
//!                   ┌──────────────┐                   ┌──────────────┐
//!                   │ Completion   │◀──────────────────│ Transmitter  │
//!                   │ Handler      │   status code     │ (HTTP POST)  │
//!                   └──────────────┘                   └──────────────┘
//! ```
//!
//! Only a 2xx response advances the stored fingerprint and removes the
//! marker; any other outcome leaves both in place and the next tick retries.

pub mod completion;
pub mod config;
pub mod dedup_store;
pub mod file_selector;
pub mod fingerprint;
pub mod fs;
pub mod pipeline;
pub mod scheduler;
pub mod signal_gate;
pub mod transmitter;

pub use completion::{Completion, CompletionError, CompletionHandler};
pub use config::{Config, ConfigValidationError};
pub use dedup_store::{DedupStore, StoreError};
pub use file_selector::{CandidateFile, FilePattern, FileSelector, SelectError};
pub use fingerprint::{fingerprint_file, Fingerprint, FingerprintError};
pub use fs::{DirEntryInfo, DiskFs, Filesystem, MemoryFs};
pub use pipeline::{SyncAgent, TickError, TickOutcome};
pub use scheduler::{run_tick, InFlight, Scheduler, SchedulerError};
pub use signal_gate::SignalGate;
pub use transmitter::{HttpTransmitter, TransmissionResult, TransmitError, Transmitter};

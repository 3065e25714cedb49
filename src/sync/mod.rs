//! Session upload.
//!
//! - **Types**: wire shapes, run options and the run report
//! - **Batching**: fixed-size batches with a SHA-256 checksum each
//! - **Transport**: the upload seam plus the HTTP implementation
//! - **Orchestrator**: the per-run state machine
//! - **Lock**: the guard that keeps hook runs from overlapping
//!
//! # Example
//!
//! ```ignore
//! use sessync::config::ConfigStore;
//! use sessync::readers::ClaudeReader;
//! use sessync::sync::{HttpTransport, Orchestrator, SyncOptions};
//!
//! let orch = Orchestrator::new(
//!     ClaudeReader::new(claude_dir),
//!     HttpTransport::new(api_url, token),
//!     ConfigStore::new(config_path),
//! );
//! let report = orch.run(&SyncOptions::default()).await?;
//! ```

mod batch;
mod lock;
mod orchestrator;
mod transport;
mod types;

pub use batch::{batch_count, build_batches, content_hash, BATCH_SIZE};
pub use lock::{HookLock, LockInfo, STALE_AFTER};
pub use orchestrator::{
    run_hook_sync, Orchestrator, DEFAULT_BATCH_DELAY, DEFAULT_RETRY_DELAY,
    FIRST_RUN_LOOKBACK_DAYS, MIN_SESSION_SECS,
};
pub use transport::{status_error, HttpTransport, UploadTransport};
pub use types::{
    ApiSession, ApiSessionData, ApiSessionMetadata, StreakInfo, SyncOptions, SyncOutcome,
    SyncReport, SyncStage, UploadBatch, UploadResponse,
};

//! # chainlog-store
//!
//! The chain state keeper and the row logs it persists to.
//!
//! ## Overview
//!
//! [`ChainStateKeeper`] wraps any [`EventLog`](chainlog_core::EventLog) and
//! implements [`ChainStore`](chainlog_core::ChainStore): it owns the head,
//! serializes commits with a compare-and-swap, and recovers the head from
//! the last row on open. Two logs ship with the crate:
//!
//! - [`MemoryEventLog`]: rows in a `Vec`; nothing survives the process.
//! - [`JsonlEventLog`]: one JSON object per line, rolled back on failed
//!   appends and repaired on a writable open after a torn write. A
//!   read-only open leaves the file exactly as it found it.
//!
//! [`ChainRegistry`] holds several independent chains side by side.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainlog_store::{ChainStateKeeper, JsonlEventLog};
//!
//! let log = JsonlEventLog::open("audit/chain.jsonl", true)?;
//! let keeper = Arc::new(ChainStateKeeper::open(ChainId::new("tenant-a"), log)?);
//! let gateway = AdmissionGateway::new(keeper.clone(), RetryPolicy::default());
//! ```

use std::sync::Arc;

use chainlog_contracts::{error::ChainlogResult, event::ChainId};
use chainlog_core::{
    config::{StoreBackend, StoreConfig},
    traits::ChainStore,
};

pub mod file;
pub mod keeper;
pub mod memory;
pub mod registry;

pub use file::JsonlEventLog;
pub use keeper::ChainStateKeeper;
pub use memory::MemoryEventLog;
pub use registry::ChainRegistry;

/// Build the chain handle described by a `[store]` config section.
pub fn open_store(config: &StoreConfig) -> ChainlogResult<Arc<dyn ChainStore>> {
    let chain_id = ChainId::new(config.chain_id.clone());
    let store: Arc<dyn ChainStore> = match config.backend {
        StoreBackend::Memory => Arc::new(ChainStateKeeper::open(chain_id, MemoryEventLog::new())?),
        StoreBackend::File => {
            let log = JsonlEventLog::open(&config.path, config.sync_on_commit)?;
            Arc::new(ChainStateKeeper::open(chain_id, log)?)
        }
    };
    Ok(store)
}

/// Like [`open_store`], but a file-backed chain must already exist and is
/// never written: no file is created, no tail is repaired, commits fail.
pub fn open_store_read_only(config: &StoreConfig) -> ChainlogResult<Arc<dyn ChainStore>> {
    let chain_id = ChainId::new(config.chain_id.clone());
    let store: Arc<dyn ChainStore> = match config.backend {
        StoreBackend::Memory => Arc::new(ChainStateKeeper::open(chain_id, MemoryEventLog::new())?),
        StoreBackend::File => {
            let log = JsonlEventLog::open_read_only(&config.path)?;
            Arc::new(ChainStateKeeper::open(chain_id, log)?)
        }
    };
    Ok(store)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

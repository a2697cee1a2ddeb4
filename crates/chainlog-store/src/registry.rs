//! Independent chains, one per tenant or shard.
//!
//! Each registered chain has its own keeper, head and commit order. The
//! registry only hands out handles; it never orders events across chains.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use tracing::info;

use chainlog_contracts::{
    error::{ChainlogError, ChainlogResult},
    event::ChainId,
};
use chainlog_core::traits::ChainStore;

use crate::{keeper::ChainStateKeeper, memory::MemoryEventLog};

/// A set of named, independent chain handles.
#[derive(Default)]
pub struct ChainRegistry {
    chains: RwLock<BTreeMap<ChainId, Arc<dyn ChainStore>>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chain under its own `chain_id()`.
    ///
    /// Fails with `Validation` if a chain with that id is already present.
    pub fn register(&self, store: Arc<dyn ChainStore>) -> ChainlogResult<()> {
        let chain_id = store.chain_id().clone();
        let mut chains = self.write()?;
        if chains.contains_key(&chain_id) {
            return Err(ChainlogError::validation(format!(
                "chain '{}' is already registered",
                chain_id
            )));
        }
        info!(chain_id = %chain_id, "chain registered");
        chains.insert(chain_id, store);
        Ok(())
    }

    /// Look up a chain, `NotFound` if it was never registered.
    pub fn get(&self, chain_id: &ChainId) -> ChainlogResult<Arc<dyn ChainStore>> {
        self.chains
            .read()
            .map_err(|e| ChainlogError::storage(format!("registry lock poisoned: {}", e)))?
            .get(chain_id)
            .cloned()
            .ok_or_else(|| ChainlogError::not_found(format!("chain '{}'", chain_id)))
    }

    /// Return the chain, creating an empty in-memory one if absent.
    pub fn get_or_create_in_memory(&self, chain_id: &ChainId) -> ChainlogResult<Arc<dyn ChainStore>> {
        let mut chains = self.write()?;
        if let Some(store) = chains.get(chain_id) {
            return Ok(store.clone());
        }
        let store: Arc<dyn ChainStore> = Arc::new(ChainStateKeeper::open(
            chain_id.clone(),
            MemoryEventLog::new(),
        )?);
        chains.insert(chain_id.clone(), store.clone());
        Ok(store)
    }

    /// Registered chain ids in sorted order.
    pub fn chain_ids(&self) -> ChainlogResult<Vec<ChainId>> {
        Ok(self
            .chains
            .read()
            .map_err(|e| ChainlogError::storage(format!("registry lock poisoned: {}", e)))?
            .keys()
            .cloned()
            .collect())
    }

    fn write(
        &self,
    ) -> ChainlogResult<std::sync::RwLockWriteGuard<'_, BTreeMap<ChainId, Arc<dyn ChainStore>>>> {
        self.chains
            .write()
            .map_err(|e| ChainlogError::storage(format!("registry lock poisoned: {}", e)))
    }
}

//! Process-wide cache manager

use super::manager::CacheManager;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

static GLOBAL: RwLock<Option<Arc<CacheManager>>> = RwLock::new(None);

/// The shared manager, built on first use.
pub fn global() -> Arc<CacheManager> {
    if let Some(manager) = GLOBAL.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Arc::clone(manager);
    }
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert_with(|| {
        debug!("Initializing global cache manager");
        Arc::new(CacheManager::new())
    }))
}

/// Replace the shared manager.
pub fn set_global(manager: Arc<CacheManager>) {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(manager);
}

/// Drop the shared manager; the next [`global`] call builds a fresh one.
pub fn reset_global() {
    if let Some(manager) = GLOBAL.write().unwrap_or_else(PoisonError::into_inner).take() {
        manager.clear();
    }
}

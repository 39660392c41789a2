use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::ActionSelector;

/// A selector pinned to the version it was installed as.
#[derive(Debug)]
pub struct VersionedSelector {
    pub version: u64,
    pub selector: ActionSelector,
}

/// The active selector, shared read-mostly by every session.
///
/// Readers take an `Arc` to the current version and keep using it for the
/// whole turn, so a swap never changes a table mid-read. Writers install a
/// complete new selector; nothing is mutated in place.
#[derive(Debug)]
pub struct PolicyHandle {
    current: RwLock<Arc<VersionedSelector>>,
}

impl PolicyHandle {
    pub fn new(selector: ActionSelector) -> Self {
        Self {
            current: RwLock::new(Arc::new(VersionedSelector {
                version: 1,
                selector,
            })),
        }
    }

    pub async fn current(&self) -> Arc<VersionedSelector> {
        self.current.read().await.clone()
    }

    /// Install `selector` as the next version. Returns the new version.
    pub async fn swap(&self, selector: ActionSelector) -> u64 {
        let mut slot = self.current.write().await;
        let version = slot.version + 1;
        info!(
            version,
            kind = %selector.kind(),
            episodes_trained = selector.episodes_trained(),
            "policy swapped"
        );
        *slot = Arc::new(VersionedSelector { version, selector });
        version
    }
}

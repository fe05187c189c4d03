//! Per-item serialisation for read-modify-write updates.
//!
//! Tool calls of one model turn run concurrently, so two handlers may load,
//! change and store the same key-value item at once. Holding the item's guard
//! across the whole cycle keeps the later writer from discarding the earlier
//! one's changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Shared table of item guards; clones refer to the same table.
#[derive(Clone, Default)]
pub struct ItemLocks {
    slots: Arc<Mutex<HashMap<(String, String), Slot>>>,
}

impl ItemLocks {
    /// Waits until no other holder is updating the item at `(pk, sk)`.
    pub async fn acquire(&self, pk: &str, sk: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Only the table references an idle slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry((pk.to_string(), sk.to_string())).or_default().clone()
        };
        slot.lock_owned().await
    }

    fn tracked(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl std::fmt::Debug for ItemLocks {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ItemLocks").field("tracked", &self.tracked()).finish()
    }
}

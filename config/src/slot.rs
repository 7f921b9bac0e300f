// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The per-worker configuration mailbox.
//!
//! The reload coordinator publishes the next configuration here; the
//! worker polls the slot once per loop iteration and swaps the new bundle
//! in at an iteration boundary. `arc-swap` gives the atomic
//! release-publish / acquire-consume pointer semantics; reclamation of
//! the old bundle is the `Arc` refcount.

use crate::runtime::Configuration;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// One worker's mailbox for pending configurations.
#[derive(Default)]
pub struct ConfigSlot {
    next: ArcSwapOption<Configuration>,
}

impl ConfigSlot {
    /// An empty slot.
    pub fn new() -> Self {
        ConfigSlot {
            next: ArcSwapOption::const_empty(),
        }
    }

    /// Publish `config` for pickup, replacing any not-yet-consumed
    /// predecessor.
    pub fn publish(&self, config: Arc<Configuration>) {
        self.next.store(Some(config));
    }

    /// Take the pending configuration, if any. The fast path is a single
    /// load so an idle slot costs no cache-line writes.
    pub fn take(&self) -> Option<Arc<Configuration>> {
        if self.next.load().is_none() {
            return None;
        }
        self.next.swap(None)
    }

    /// True iff a published configuration has not been consumed yet.
    pub fn is_pending(&self) -> bool {
        self.next.load().is_some()
    }
}

impl std::fmt::Debug for ConfigSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSlot")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use xlat::NatTable;

    fn empty_config() -> Arc<Configuration> {
        Arc::new(Configuration::new(Vec::new(), NatTable::new(), None))
    }

    #[test]
    fn publish_take_cycle() {
        let slot = ConfigSlot::new();
        assert!(slot.take().is_none());
        assert!(!slot.is_pending());

        let cfg = empty_config();
        slot.publish(Arc::clone(&cfg));
        assert!(slot.is_pending());

        let taken = slot.take().unwrap();
        assert!(Arc::ptr_eq(&taken, &cfg));
        assert!(slot.take().is_none());
    }

    #[test]
    fn publish_replaces_pending() {
        let slot = ConfigSlot::new();
        let first = empty_config();
        let second = empty_config();
        slot.publish(Arc::clone(&first));
        slot.publish(Arc::clone(&second));
        let taken = slot.take().unwrap();
        assert!(Arc::ptr_eq(&taken, &second));
    }
}

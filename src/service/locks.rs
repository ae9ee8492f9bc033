//! Keyed async locks serializing writers per case-folded name and per entity id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub fn name_key(name: &str) -> String {
    format!("name:{}", name.to_lowercase())
}

pub fn entity_key(id: i32) -> String {
    format!("entity:{}", id)
}

#[derive(Default)]
pub struct LockRegistry {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards held for the rest of an operation; released on drop.
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in sorted order, waiting as long as needed.
    pub async fn acquire(&self, mut keys: Vec<String>) -> LockSet {
        keys.sort();
        keys.dedup();
        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            slots.retain(|_, m| Arc::strong_count(m) > 1);
            keys.iter()
                .map(|k| slots.entry(k.clone()).or_default().clone())
                .collect()
        };
        let mut guards = Vec::with_capacity(handles.len());
        for h in handles {
            guards.push(h.lock_owned().await);
        }
        LockSet { _guards: guards }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_in_any_case_is_serialized() {
        let locks = Arc::new(LockRegistry::new());
        let held = locks.acquire(vec![name_key("Orders")]).await;
        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.acquire(vec![name_key("ORDERS")]).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = LockRegistry::new();
        drop(locks.acquire(vec![entity_key(1), name_key("a")]).await);
        let _g = locks.acquire(vec![entity_key(2)]).await;
        assert_eq!(locks.len(), 1);
    }
}

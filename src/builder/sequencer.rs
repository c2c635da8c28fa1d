//! Per-key serialisation
//!
//! [`KeyedMutex`] hands out one async lock per key so that work for
//! different senders (or wallets) runs in parallel while work for the
//! same one is serialised. [`Sequencer`] uses it to assign sequence
//! numbers that never collide within this process.

use crate::core::Address;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Slot contents that carry no state worth keeping
pub trait Vacant {
    fn is_vacant(&self) -> bool;
}

impl Vacant for () {
    fn is_vacant(&self) -> bool {
        true
    }
}

impl<T> Vacant for Vec<T> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

type Slots<K, T> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<T>>>>>;

/// A map of independently lockable slots. Vacant slots are removed once
/// their last guard drops, so the map only holds keys with live state.
#[derive(Debug)]
pub struct KeyedMutex<K, T> {
    slots: Slots<K, T>,
}

impl<K, T> Default for KeyedMutex<K, T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> KeyedMutex<K, T>
where
    K: Eq + Hash + Clone,
    T: Default + Vacant,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the slot for `key`
    pub async fn lock(&self, key: &K) -> KeyedGuard<K, T> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key.clone()).or_default().clone()
        };
        KeyedGuard {
            key: key.clone(),
            slots: self.slots.clone(),
            guard: slot.lock_owned().await,
        }
    }

    /// Number of keys currently held in the map
    pub fn tracked_keys(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one slot of a [`KeyedMutex`]
pub struct KeyedGuard<K: Eq + Hash, T: Vacant> {
    key: K,
    slots: Slots<K, T>,
    guard: OwnedMutexGuard<T>,
}

impl<K: Eq + Hash, T: Vacant> Deref for KeyedGuard<K, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<K: Eq + Hash, T: Vacant> DerefMut for KeyedGuard<K, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<K: Eq + Hash, T: Vacant> Drop for KeyedGuard<K, T> {
    fn drop(&mut self) {
        if !self.guard.is_vacant() {
            return;
        }
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mutex = OwnedMutexGuard::mutex(&self.guard);
        // Clones are only taken under the map lock: a count of two (map and
        // this guard) means nobody is waiting for the slot
        let idle = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, mutex) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(&self.key);
        }
    }
}

/// Local view of one sender's sequence numbers
#[derive(Debug, Default)]
pub struct SenderSlot {
    next_unused: Option<u64>,
}

/// Exclusive claim on a sender's sequence numbers
pub type SenderGuard = KeyedGuard<Address, SenderSlot>;

impl Vacant for SenderSlot {
    fn is_vacant(&self) -> bool {
        self.next_unused.is_none()
    }
}

impl SenderSlot {
    /// Pick the sequence number for the next transaction: the ledger's
    /// pending count, unless this process already used it
    pub fn assign(&self, remote_next: u64) -> u64 {
        match self.next_unused {
            Some(local) => local.max(remote_next),
            None => remote_next,
        }
    }

    /// Record that `used` was accepted by the ledger
    pub fn commit(&mut self, used: u64) {
        self.next_unused = Some(used + 1);
    }

    /// Drop the local view and trust the ledger again
    pub fn reset(&mut self) {
        self.next_unused = None;
    }
}

/// Sequence number allocation per sender address
#[derive(Debug, Default)]
pub struct Sequencer {
    senders: KeyedMutex<Address, SenderSlot>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold this for the whole fetch, sign and broadcast sequence
    pub async fn lock(&self, sender: &Address) -> SenderGuard {
        self.senders.lock(sender).await
    }

    /// Senders with a local sequence number on record
    pub fn tracked_senders(&self) -> usize {
        self.senders.tracked_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_assign_prefers_larger() {
        let mut slot = SenderSlot::default();
        assert_eq!(slot.assign(4), 4);
        slot.commit(4);
        // Node has not caught up with our last broadcast yet
        assert_eq!(slot.assign(4), 5);
        // Someone else used the key
        assert_eq!(slot.assign(9), 9);
        slot.reset();
        assert_eq!(slot.assign(2), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_serialised() {
        let locks = Arc::new(KeyedMutex::<u8, ()>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedMutex::<u8, ()>::new();
        let _a = locks.lock(&1).await;
        // Would deadlock if keys shared a lock
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock(&2))
            .await
            .unwrap();
    }

    fn slot_refs(locks: &KeyedMutex<u8, Vec<u32>>, key: u8) -> usize {
        let slots = locks.slots.lock().unwrap();
        slots.get(&key).map(Arc::strong_count).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_vacant_slots_are_reclaimed() {
        let locks = KeyedMutex::<u8, Vec<u32>>::new();
        for key in 0..100 {
            let _guard = locks.lock(&key).await;
        }
        assert_eq!(locks.tracked_keys(), 0);

        let mut guard = locks.lock(&7).await;
        guard.push(1);
        drop(guard);
        assert_eq!(locks.tracked_keys(), 1);
        // State survives until the slot is emptied again
        let mut guard = locks.lock(&7).await;
        assert_eq!(*guard, vec![1]);
        guard.clear();
        drop(guard);
        assert_eq!(locks.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_slot_kept_while_another_task_waits() {
        let locks = Arc::new(KeyedMutex::<u8, Vec<u32>>::new());
        let first = locks.lock(&1).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let mut guard = locks.lock(&1).await;
                guard.push(2);
            })
        };
        // Let the waiter take its clone of the slot and block on it
        for _ in 0..1000 {
            if slot_refs(&locks, 1) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(slot_refs(&locks, 1), 3);

        drop(first);
        assert_eq!(locks.tracked_keys(), 1);
        waiter.await.unwrap();

        // The waiter's write landed in the same slot
        assert_eq!(*locks.lock(&1).await, vec![2]);
        assert_eq!(locks.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_committed_senders_are_kept() {
        let sequencer = Sequencer::new();
        let sender = Address::ZERO;
        let other = Address::from_slice(&[1u8; 20]).unwrap();

        let mut guard = sequencer.lock(&sender).await;
        guard.commit(3);
        drop(guard);
        // A lock that records nothing leaves no entry behind
        drop(sequencer.lock(&other).await);
        assert_eq!(sequencer.tracked_senders(), 1);

        let mut guard = sequencer.lock(&sender).await;
        assert_eq!(guard.assign(0), 4);
        guard.reset();
        drop(guard);
        assert_eq!(sequencer.tracked_senders(), 0);
    }
}

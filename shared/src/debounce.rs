//! Per-key debounced writes.
//!
//! Each key owns a slot holding the pending payload, the write to run with
//! it, the timer task, and a write lane. Scheduling again before the timer
//! fires replaces the payload and restarts the timer. Once a timer has taken
//! its payload it is never aborted, and the lane keeps a later write for the
//! same key from starting until it has finished.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

pub type WriteFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type WriteFn<P> = Box<dyn FnOnce(P) -> WriteFuture + Send + 'static>;

struct Slot<P> {
    generation: u64,
    payload: Option<P>,
    write: Option<WriteFn<P>>,
    timer: Option<JoinHandle<()>>,
    lane: Arc<tokio::sync::Mutex<()>>,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            generation: 0,
            payload: None,
            write: None,
            timer: None,
            lane: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

impl<P> Slot<P> {
    fn is_idle(&self) -> bool {
        self.payload.is_none() && self.timer.is_none() && Arc::strong_count(&self.lane) == 1
    }
}

type Slots<K, P> = Arc<Mutex<HashMap<K, Slot<P>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DebouncedWriter<K, P> {
    slots: Slots<K, P>,
}

impl<K, P> Clone for DebouncedWriter<K, P> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K, P> Default for DebouncedWriter<K, P> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, P> fmt::Debug for DebouncedWriter<K, P>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = lock(&self.slots);
        f.debug_struct("DebouncedWriter")
            .field("keys", &slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, P> DebouncedWriter<K, P>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    P: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins: any pending payload for `key` is dropped.
    pub fn schedule<F>(&self, key: K, payload: P, write: F, delay: Duration)
    where
        F: FnOnce(P) -> WriteFuture + Send + 'static,
    {
        self.schedule_with(key, delay, move |_| payload, write);
    }

    /// Fold a new payload into the pending one with `merge` and restart the
    /// timer. `write` replaces the previously scheduled write.
    pub fn schedule_with<M, F>(&self, key: K, delay: Duration, merge: M, write: F)
    where
        M: FnOnce(Option<P>) -> P,
        F: FnOnce(P) -> WriteFuture + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        let slot = slots.entry(key.clone()).or_default();

        slot.generation += 1;
        let merged = merge(slot.payload.take());
        slot.payload = Some(merged);
        slot.write = Some(Box::new(write));
        if let Some(timer) = slot.timer.take() {
            timer.abort();
            trace!(?key, "debounce timer reset");
        }
        slot.timer = Some(tokio::spawn(fire(
            Arc::clone(&self.slots),
            key,
            slot.generation,
            delay,
        )));
    }

    /// Drop the pending write for `key` and hand back its payload. A write
    /// that already started is not affected.
    pub fn cancel(&self, key: &K) -> Option<P> {
        let mut slots = lock(&self.slots);
        let slot = slots.get_mut(key)?;
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.write = None;
        let payload = slot.payload.take();
        if slot.is_idle() {
            slots.remove(key);
        }
        payload
    }

    pub fn cancel_all(&self) -> Vec<(K, P)> {
        let keys = self.pending_keys();
        keys.into_iter()
            .filter_map(|key| self.cancel(&key).map(|payload| (key, payload)))
            .collect()
    }

    /// Run the pending write for `key` now and wait for it. Returns false if
    /// nothing was pending.
    pub async fn flush(&self, key: &K) -> bool {
        let handle = {
            let mut slots = lock(&self.slots);
            let Some(slot) = slots.get_mut(key) else {
                return false;
            };
            if slot.payload.is_none() {
                return false;
            }
            slot.generation += 1;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            tokio::spawn(fire(
                Arc::clone(&self.slots),
                key.clone(),
                slot.generation,
                Duration::ZERO,
            ))
        };
        handle.await.is_ok()
    }

    pub async fn flush_all(&self) {
        for key in self.pending_keys() {
            self.flush(&key).await;
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.slots)
            .get(key)
            .is_some_and(|slot| slot.payload.is_some())
    }

    pub fn pending_keys(&self) -> Vec<K> {
        lock(&self.slots)
            .iter()
            .filter(|(_, slot)| slot.payload.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

async fn fire<K, P>(slots: Slots<K, P>, key: K, generation: u64, delay: Duration)
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    P: Send + 'static,
{
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let lane = {
        let guard = lock(&slots);
        match guard.get(&key) {
            Some(slot) if slot.generation == generation => Arc::clone(&slot.lane),
            _ => return,
        }
    };
    let in_lane = lane.lock().await;

    let job = {
        let mut guard = lock(&slots);
        match guard.get_mut(&key) {
            Some(slot) if slot.generation == generation => {
                slot.timer = None;
                slot.payload.take().zip(slot.write.take())
            }
            _ => None,
        }
    };

    if let Some((payload, write)) = job {
        trace!(?key, "debounced write started");
        write(payload).await;
    }

    drop(in_lane);
    drop(lane);

    let mut guard = lock(&slots);
    if guard.get(&key).is_some_and(Slot::is_idle) {
        guard.remove(&key);
    }
}

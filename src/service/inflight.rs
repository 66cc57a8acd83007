//! Singleflight tracking of work in progress
//!
//! At most one producer runs per key. Everyone else who asks for the key
//! while it is in flight waits for the producer's result instead of
//! starting a duplicate. The key is released when the producer's
//! [`FlightGuard`] is dropped, whether it completed, failed or panicked.

use crate::error::Error;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Outcome shared with every waiter of a flight
pub type FlightResult<V> = std::result::Result<V, Arc<Error>>;

type Slot<V> = Option<FlightResult<V>>;
type FlightMap<K, V> = Arc<Mutex<HashMap<K, watch::Receiver<Slot<V>>>>>;

/// Process-wide set of keys currently being produced
pub struct InFlight<K, V> {
    flights: FlightMap<K, V>,
}

impl<K, V> Clone for InFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> std::fmt::Debug for InFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("len", &lock(&self.flights).len())
            .finish()
    }
}

/// Result of [`InFlight::claim`]
pub enum Claim<K: Hash + Eq, V> {
    /// The caller now owns the key and must produce it
    Leader(FlightGuard<K, V>),
    /// Someone else is producing the key
    Waiter(Flight<V>),
}

/// Handle for awaiting another producer's result
pub struct Flight<V> {
    rx: watch::Receiver<Slot<V>>,
}

impl<V: Clone> Flight<V> {
    /// Wait for the producer to finish
    ///
    /// `None` means the producer went away without a result; the key has
    /// been released and may be claimed again.
    pub async fn wait(mut self) -> Option<FlightResult<V>> {
        let _ = self.rx.wait_for(Option::is_some).await;
        self.rx.borrow().clone()
    }
}

/// Ownership of an in-flight key
///
/// Dropping the guard releases the key. Call [`FlightGuard::complete`] to
/// hand the result to waiters first.
pub struct FlightGuard<K: Hash + Eq, V> {
    flights: FlightMap<K, V>,
    key: K,
    tx: watch::Sender<Slot<V>>,
}

impl<K: Hash + Eq, V> FlightGuard<K, V> {
    /// Key owned by this guard
    pub fn key(&self) -> &K {
        &self.key
    }

    /// A handle that resolves when this guard completes or is dropped
    pub fn subscribe(&self) -> Flight<V> {
        Flight {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish the result to all waiters and release the key
    pub fn complete(self, result: FlightResult<V>) {
        self.tx.send_replace(Some(result));
    }
}

impl<K: Hash + Eq, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        lock(&self.flights).remove(&self.key);
    }
}

impl<K: Hash + Eq + Clone, V: Clone> InFlight<K, V> {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically become the producer for `key` or join the running flight
    pub fn claim(&self, key: K) -> Claim<K, V> {
        let mut flights = lock(&self.flights);
        if let Some(rx) = flights.get(&key) {
            return Claim::Waiter(Flight { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.clone(), rx);
        Claim::Leader(FlightGuard {
            flights: Arc::clone(&self.flights),
            key,
            tx,
        })
    }

    /// Claim `key` only if nobody is producing it
    pub fn try_claim(&self, key: K) -> Option<FlightGuard<K, V>> {
        match self.claim(key) {
            Claim::Leader(guard) => Some(guard),
            Claim::Waiter(_) => None,
        }
    }

    /// Get the result for `key`, calling `start` with the guard if this
    /// caller becomes the producer
    ///
    /// `start` must hand the guard to work that completes it; it is invoked
    /// at most once. Returns the result (if any) and whether this caller
    /// was the producer.
    pub async fn join_or_start<F>(&self, key: K, start: F) -> (Option<FlightResult<V>>, bool)
    where
        F: FnOnce(FlightGuard<K, V>),
    {
        let mut start = Some(start);
        loop {
            match self.claim(key.clone()) {
                Claim::Leader(guard) => {
                    let flight = guard.subscribe();
                    if let Some(start) = start.take() {
                        start(guard);
                    }
                    return (flight.wait().await, true);
                }
                Claim::Waiter(flight) => {
                    if let Some(result) = flight.wait().await {
                        return (Some(result), false);
                    }
                    // The producer vanished; claim again
                }
            }
        }
    }

    /// Whether `key` is being produced right now
    pub fn contains(&self, key: &K) -> bool {
        lock(&self.flights).contains_key(key)
    }

    /// Number of keys in flight
    pub fn len(&self) -> usize {
        lock(&self.flights).len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<K, V>(flights: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

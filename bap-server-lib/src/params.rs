//! Typed parameter store: `get_parameter`/`set_parameter` and
//! `watch_parameter`/`unwatch_parameter`, where watchers become
//! subscribers on a per-parameter topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, Mutex};

/// A parameter identifier. The driver port defines the concrete set;
/// this is a stand-in vocabulary covering the operations the core needs to
/// reason about scope and change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    AutoRepeatEnabled,
    AutoRepeatDelayMs,
    AutoRepeatIntervalMs,
    DisplayRotation,
    Custom(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScope {
    /// Local to one connection.
    Local,
    /// Server-wide.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    U32(u32),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Topic {
    id: ParamId,
    subparam: u32,
    scope_is_global: bool,
    connection_id: Option<u64>,
}

/// A watch descriptor returned by `watch_parameter`, to be handed back to
/// `unwatch_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchDescriptor(u64);

struct TopicState {
    value: ParamValue,
    sender: broadcast::Sender<ParamValue>,
}

/// Global parameter store. Per-connection local parameters are namespaced
/// by `connection_id` inside the same map so the lock-order story stays
/// simple (one mutex, not one per connection).
pub struct ParamStore {
    topics: Mutex<HashMap<Topic, TopicState>>,
    next_descriptor: AtomicU64,
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamStore {
    pub fn new() -> Self {
        ParamStore {
            topics: Mutex::new(HashMap::new()),
            next_descriptor: AtomicU64::new(1),
        }
    }

    fn topic(id: ParamId, subparam: u32, scope: ParamScope, connection_id: u64) -> Topic {
        Topic {
            id,
            subparam,
            scope_is_global: matches!(scope, ParamScope::Global),
            connection_id: if matches!(scope, ParamScope::Global) {
                None
            } else {
                Some(connection_id)
            },
        }
    }

    pub async fn get(
        &self,
        id: ParamId,
        subparam: u32,
        scope: ParamScope,
        connection_id: u64,
        default: ParamValue,
    ) -> ParamValue {
        let topics = self.topics.lock().await;
        let key = Self::topic(id, subparam, scope, connection_id);
        topics.get(&key).map(|t| t.value.clone()).unwrap_or(default)
    }

    /// Sets the value and notifies any subscribers on the topic.
    pub async fn set(
        &self,
        id: ParamId,
        subparam: u32,
        scope: ParamScope,
        connection_id: u64,
        value: ParamValue,
    ) {
        let mut topics = self.topics.lock().await;
        let key = Self::topic(id, subparam, scope, connection_id);
        match topics.get_mut(&key) {
            Some(state) => {
                state.value = value.clone();
                let _ = state.sender.send(value);
            }
            None => {
                let (tx, _rx) = broadcast::channel(16);
                let _ = tx.send(value.clone());
                topics.insert(key, TopicState { value, sender: tx });
            }
        }
    }

    /// Subscribes to future changes of this parameter. Returns a receiver
    /// and a descriptor; the caller is responsible for turning received
    /// values into `parameter-update` events on its own socket.
    pub async fn watch(
        &self,
        id: ParamId,
        subparam: u32,
        scope: ParamScope,
        connection_id: u64,
    ) -> (WatchDescriptor, broadcast::Receiver<ParamValue>) {
        let mut topics = self.topics.lock().await;
        let key = Self::topic(id, subparam, scope, connection_id);
        let sender = match topics.get(&key) {
            Some(state) => state.sender.clone(),
            None => {
                let (tx, _rx) = broadcast::channel(16);
                let default = ParamValue::U32(0);
                topics.insert(
                    key,
                    TopicState { value: default, sender: tx.clone() },
                );
                tx
            }
        };
        let descriptor = WatchDescriptor(self.next_descriptor.fetch_add(1, Ordering::Relaxed));
        (descriptor, sender.subscribe())
    }

    /// `unwatch_parameter` is a client-side bookkeeping operation (drop the
    /// receiver); the store itself needs no explicit teardown because
    /// `broadcast::Receiver` unregisters on drop. Kept as a named method so
    /// callers have a single place to route the request.
    pub fn unwatch(&self, _descriptor: WatchDescriptor) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = ParamStore::new();
        store
            .set(ParamId::AutoRepeatEnabled, 0, ParamScope::Global, 0, ParamValue::Bool(true))
            .await;
        let v = store
            .get(ParamId::AutoRepeatEnabled, 0, ParamScope::Global, 0, ParamValue::Bool(false))
            .await;
        assert_eq!(v, ParamValue::Bool(true));
    }

    #[tokio::test]
    async fn watchers_see_subsequent_updates() {
        let store = ParamStore::new();
        let (_descriptor, mut rx) = store
            .watch(ParamId::DisplayRotation, 0, ParamScope::Global, 1)
            .await;
        store
            .set(ParamId::DisplayRotation, 0, ParamScope::Global, 1, ParamValue::U32(90))
            .await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update, ParamValue::U32(90));
    }

    #[tokio::test]
    async fn local_scope_is_namespaced_per_connection() {
        let store = ParamStore::new();
        store
            .set(ParamId::AutoRepeatEnabled, 0, ParamScope::Local, 1, ParamValue::Bool(true))
            .await;
        let v = store
            .get(ParamId::AutoRepeatEnabled, 0, ParamScope::Local, 2, ParamValue::Bool(false))
            .await;
        assert_eq!(v, ParamValue::Bool(false));
    }
}

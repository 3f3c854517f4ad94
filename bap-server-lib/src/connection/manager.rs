//! The connection registry: surplus unauthenticated peers are rejected
//! before the version frame, separately from the cap on fully
//! authenticated connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::connection::connection::Connection;

#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("too many unauthenticated connections in flight (current: {current}, limit: {limit})")]
    TooManyUnauthenticated { current: usize, limit: usize },
}

/// Owns every live `Connection`, keyed by id. A separate atomic tracks how
/// many are still unauthenticated so the accept path can reject surplus
/// peers without taking the full registry lock.
pub struct ConnectionRegistry {
    connections: HashMap<u64, Connection>,
    unauth_count: Arc<AtomicUsize>,
    max_unauthenticated: usize,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new(max_unauthenticated: usize) -> Self {
        ConnectionRegistry {
            connections: HashMap::new(),
            unauth_count: Arc::new(AtomicUsize::new(0)),
            max_unauthenticated,
            next_id: 1,
        }
    }

    pub fn unauth_counter(&self) -> Arc<AtomicUsize> {
        self.unauth_count.clone()
    }

    pub fn try_reserve_unauth_slot(&self) -> Result<(), AcceptError> {
        let current = self.unauth_count.load(Ordering::Relaxed);
        if current >= self.max_unauthenticated {
            return Err(AcceptError::TooManyUnauthenticated {
                current,
                limit: self.max_unauthenticated,
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, make: impl FnOnce(u64) -> Connection) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, make(id));
        id
    }

    pub fn get(&self, id: u64) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.connections.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_unauth_cap_is_reached() {
        let registry = ConnectionRegistry::new(1);
        registry.try_reserve_unauth_slot().unwrap();
        registry.unauth_counter().fetch_add(1, Ordering::Relaxed);
        assert!(registry.try_reserve_unauth_slot().is_err());
    }
}

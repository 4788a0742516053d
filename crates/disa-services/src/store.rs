//! In-memory repository owned by exactly one service.
//!
//! Rows are keyed by a sequential `u64` starting at 1. Every mutation runs
//! under the write lock, so a check-then-set inside [`Store::update`] is
//! atomic with respect to other callers of the same store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug)]
struct Rows<T> {
    next_id: u64,
    rows: BTreeMap<u64, T>,
}

/// A cloneable handle to one service's rows.
#[derive(Debug)]
pub struct Store<T> {
    inner: Arc<RwLock<Rows<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Rows {
                next_id: 1,
                rows: BTreeMap::new(),
            })),
        }
    }
}

impl<T: Clone> Store<T> {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id, build the row from it, and insert it.
    pub async fn insert_with(&self, build: impl FnOnce(u64) -> T) -> T {
        let mut guard = self.inner.write().await;
        let id = guard.next_id;
        guard.next_id = guard.next_id.saturating_add(1);
        let row = build(id);
        guard.rows.insert(id, row.clone());
        row
    }

    /// The row with `id`.
    pub async fn get(&self, id: u64) -> Option<T> {
        self.inner.read().await.rows.get(&id).cloned()
    }

    /// Every row, in id order.
    pub async fn list(&self) -> Vec<T> {
        self.inner.read().await.rows.values().cloned().collect()
    }

    /// Rows matching `pred`, in id order.
    pub async fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.inner
            .read()
            .await
            .rows
            .values()
            .filter(|row| pred(row))
            .cloned()
            .collect()
    }

    /// Mutate the row with `id` under the write lock. `None` if absent.
    pub async fn update<R>(&self, id: u64, apply: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.write().await.rows.get_mut(&id).map(apply)
    }

    /// Mutate every row under one write lock, collecting `apply`'s results.
    pub async fn update_all<R>(&self, mut apply: impl FnMut(&mut T) -> Option<R>) -> Vec<R> {
        self.inner
            .write()
            .await
            .rows
            .values_mut()
            .filter_map(|row| apply(row))
            .collect()
    }

    /// Remove the row with `id`, returning it.
    pub async fn remove(&self, id: u64) -> Option<T> {
        self.inner.write().await.rows.remove(&id)
    }

    /// Number of rows.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.rows.is_empty()
    }
}

//! Unit selection and load accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::pool::PoolWorker;

/// Where the next job goes.
#[derive(Debug)]
pub enum Selection {
    Existing(Arc<PoolWorker>),
    /// Start a new unit and use it.
    Spawn,
}

/// Idle units first, then growth, then least loaded. Closing units are
/// neither selected nor counted against `max_size`.
#[derive(Debug, Clone, Copy)]
pub struct IdleFirst {
    max_size: usize,
}

impl IdleFirst {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn select(&self, workers: &[Arc<PoolWorker>]) -> Selection {
        let live = || workers.iter().filter(|w| !w.is_closing());

        if let Some(idle) = live().find(|w| w.weight() == 0) {
            return Selection::Existing(idle.clone());
        }
        if live().count() < self.max_size {
            return Selection::Spawn;
        }

        // In case of tie, the lowest id is selected (stability)
        live()
            .min_by_key(|w| (w.weight(), w.id))
            .cloned()
            .map_or(Selection::Spawn, Selection::Existing)
    }
}

/// A RAII guard that counts one in-flight request against a unit.
#[derive(Debug)]
pub struct LoadGuard {
    weight: Arc<AtomicUsize>,
}

impl LoadGuard {
    pub fn acquire(weight: &Arc<AtomicUsize>) -> Self {
        weight.fetch_add(1, Ordering::AcqRel);
        Self {
            weight: weight.clone(),
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.weight.fetch_sub(1, Ordering::AcqRel);
    }
}

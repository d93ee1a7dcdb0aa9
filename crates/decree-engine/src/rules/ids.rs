use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use super::repository::IdGenerator;
use crate::config::IdStrategy;

/// Random v4 identifiers, prefixed by entity type.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self, prefix: &'static str) -> String {
        format!("{prefix}-{}", Uuid::new_v4().simple())
    }
}

/// Monotonic identifiers (`score-000001`), handy for fixtures and reproducible catalogs.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, prefix: &'static str) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id:06}")
    }
}

/// Generator selected by configuration. Sequential ids continue after `last_sequence`, the
/// highest suffix a loaded catalog already uses.
pub fn generator_for(strategy: IdStrategy, last_sequence: u64) -> Box<dyn IdGenerator> {
    match strategy {
        IdStrategy::Uuid => Box::new(UuidIdGenerator),
        IdStrategy::Sequential => Box::new(SequentialIdGenerator::starting_at(last_sequence + 1)),
    }
}

impl<G: IdGenerator + ?Sized> IdGenerator for Box<G> {
    fn next_id(&self, prefix: &'static str) -> String {
        (**self).next_id(prefix)
    }
}

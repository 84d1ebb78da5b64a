//! Visit Graph - lineage traversal over visits
//!
//! Each visit may name the visit that preceded it (`from_visit_local_id`)
//! inside the same user namespace. Well-formed histories are acyclic, but
//! nothing here relies on that: every walk is bounded and tracks what it
//! has already seen.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{LocalKey, Visit};
use crate::storage::SqliteStore;
use crate::Result;

/// Node cap used by callers that do not choose their own
pub const DEFAULT_MAX_NODES: usize = 50;

/// Caller-owned memo of visit lookups, keyed by compound key.
///
/// Absent visits are cached too, as `None`.
#[derive(Debug, Default)]
pub struct VisitCache {
    visits: HashMap<LocalKey, Option<Visit>>,
}

impl VisitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }
}

/// Lineage queries over the consolidated store
pub struct VisitGraph<'a> {
    store: &'a SqliteStore,
}

impl<'a> VisitGraph<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// The visit that led to `visit`, if any
    pub fn predecessor(&self, visit: &Visit) -> Result<Option<Visit>> {
        let Some(key) = visit.from_visit_key() else {
            return Ok(None);
        };
        let found = self.store.get_visit(key)?;
        if found.is_none() {
            tracing::warn!("Visit {} points at missing predecessor {}", visit.key(), key);
        }
        Ok(found)
    }

    /// Like [`predecessor`](Self::predecessor), memoizing lookups in `cache`
    pub fn predecessor_cached(&self, visit: &Visit, cache: &mut VisitCache) -> Result<Option<Visit>> {
        let Some(key) = visit.from_visit_key() else {
            return Ok(None);
        };
        if let Some(hit) = cache.visits.get(&key) {
            return Ok(hit.clone());
        }
        let found = self.predecessor(visit)?;
        cache.visits.insert(key, found.clone());
        Ok(found)
    }

    /// Visits that `visit` led to, ordered by local id
    pub fn successors(&self, visit: &Visit) -> Result<Vec<Visit>> {
        self.store.visits_from(visit.key())
    }

    /// `visit` followed by up to `max_depth` predecessors, nearest first.
    ///
    /// Stops early when the chain ends or loops back onto itself.
    pub fn lineage_chain(&self, visit: &Visit, max_depth: usize) -> Result<Vec<Visit>> {
        let mut cache = VisitCache::new();
        self.lineage_chain_cached(visit, max_depth, &mut cache)
    }

    pub fn lineage_chain_cached(
        &self,
        visit: &Visit,
        max_depth: usize,
        cache: &mut VisitCache,
    ) -> Result<Vec<Visit>> {
        let mut seen = HashSet::new();
        seen.insert(visit.key());
        let mut chain = vec![visit.clone()];

        while chain.len() <= max_depth {
            let Some(current) = chain.last() else { break };
            let Some(prev) = self.predecessor_cached(current, cache)? else {
                break;
            };
            if !seen.insert(prev.key()) {
                tracing::debug!("Lineage of {} loops at {}", visit.key(), prev.key());
                break;
            }
            chain.push(prev);
        }

        Ok(chain)
    }

    /// Visits reachable from `visit` along predecessor and successor edges,
    /// in breadth-first discovery order, starting node included, capped at
    /// `max_nodes`.
    pub fn reachable_subgraph(&self, visit: &Visit, max_nodes: usize) -> Result<Vec<Visit>> {
        let mut found = Vec::new();
        if max_nodes == 0 {
            return Ok(found);
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(visit.key());
        queue.push_back(visit.clone());

        while let Some(current) = queue.pop_front() {
            found.push(current.clone());
            if found.len() >= max_nodes {
                break;
            }

            let mut neighbours = self.successors(&current)?;
            if let Some(prev) = self.predecessor(&current)? {
                neighbours.insert(0, prev);
            }

            for next in neighbours {
                if seen.insert(next.key()) {
                    queue.push_back(next);
                }
            }
        }

        Ok(found)
    }
}

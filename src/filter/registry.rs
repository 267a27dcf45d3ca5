//! Filter registry.
//!
//! # Responsibilities
//! - Classify filters as global, subtree (`/p/*`) or exact-path
//! - Reject duplicate registrations of the same filter class
//! - Build the ordered filter list for a request path
//!
//! # Design Decisions
//! - The index is a plain value; the router clones, mutates and swaps it
//!   under the structural lock, so chain building reads a stable snapshot
//! - Subtree filters match the prefix itself and everything below it
//! - A filter instance appears at most once per chain

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::error::RegistrationError;
use crate::handler::{same_filter, SharedFilter};
use crate::routing::alias::{parent_alias, validate_alias};
use crate::routing::table::Structure;

/// Where a filter applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSpec {
    /// Every request.
    Global,
    /// The prefix and every path below it (source pattern `prefix + "/*"`).
    Prefix(String),
    /// Exactly one path.
    Exact(String),
}

impl PathSpec {
    /// Parse a servlet-style pattern: `/*`, `/p/*` or `/p`.
    pub fn parse(pattern: &str) -> Result<Self, RegistrationError> {
        let invalid = || RegistrationError::InvalidFilterPattern(pattern.to_string());

        if pattern == "/*" || pattern == "*" {
            return Ok(PathSpec::Global);
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            validate_alias(prefix).map_err(|_| invalid())?;
            return Ok(PathSpec::Prefix(prefix.to_string()));
        }
        validate_alias(pattern).map_err(|_| invalid())?;
        Ok(PathSpec::Exact(pattern.to_string()))
    }

    /// Render back into pattern form.
    pub fn pattern(&self) -> String {
        match self {
            PathSpec::Global => "/*".to_string(),
            PathSpec::Prefix(p) if p == "/" => "/*".to_string(),
            PathSpec::Prefix(p) => format!("{}/*", p),
            PathSpec::Exact(p) => p.clone(),
        }
    }
}

impl std::fmt::Display for PathSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern())
    }
}

/// One registered filter.
#[derive(Clone)]
pub struct FilterEntry {
    pub filter: SharedFilter,
    pub spec: PathSpec,
    pub owner: String,
}

impl std::fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEntry")
            .field("filter", &self.filter.name())
            .field("spec", &self.spec)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Serializable view of a registered filter.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterInfo {
    pub name: String,
    pub pattern: String,
    pub owner: String,
}

/// Static total order over filter class names.
#[derive(Debug, Clone, Default)]
pub struct FilterPriority {
    rank: HashMap<String, usize>,
}

impl FilterPriority {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rank = HashMap::new();
        for (i, name) in names.into_iter().enumerate() {
            rank.entry(name.into()).or_insert(i);
        }
        Self { rank }
    }

    pub fn is_empty(&self) -> bool {
        self.rank.is_empty()
    }

    /// Stable sort: named filters by rank, then unnamed ones by class name.
    pub fn sort(&self, filters: &mut [SharedFilter]) {
        if self.rank.is_empty() {
            return;
        }
        filters.sort_by(|a, b| {
            let ra = self.rank.get(a.name());
            let rb = self.rank.get(b.name());
            match (ra, rb) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.name().cmp(b.name()),
            }
        });
    }
}

/// Filters indexed by classification.
#[derive(Debug, Clone, Default)]
pub struct FilterIndex {
    global: Vec<FilterEntry>,
    prefix: HashMap<String, Vec<FilterEntry>>,
    exact: HashMap<String, Vec<FilterEntry>>,
}

impl FilterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, spec: &PathSpec) -> &mut Vec<FilterEntry> {
        match spec {
            PathSpec::Global => &mut self.global,
            PathSpec::Prefix(p) => self.prefix.entry(p.clone()).or_default(),
            PathSpec::Exact(p) => self.exact.entry(p.clone()).or_default(),
        }
    }

    /// Whether a filter of class `name` is registered under `spec`.
    pub fn contains_class(&self, spec: &PathSpec, name: &str) -> bool {
        let bucket = match spec {
            PathSpec::Global => Some(&self.global),
            PathSpec::Prefix(p) => self.prefix.get(p),
            PathSpec::Exact(p) => self.exact.get(p),
        };
        bucket.is_some_and(|b| b.iter().any(|e| e.filter.name() == name))
    }

    /// Insert a filter. Returns `false` when a filter of the same class is
    /// already registered under the same classification and key.
    pub fn insert(&mut self, filter: SharedFilter, spec: PathSpec, owner: &str) -> bool {
        let bucket = self.bucket_mut(&spec);
        if bucket.iter().any(|e| e.filter.name() == filter.name()) {
            return false;
        }
        bucket.push(FilterEntry {
            filter,
            spec,
            owner: owner.to_string(),
        });
        true
    }

    /// Remove every entry holding this filter instance.
    pub fn remove(&mut self, filter: &SharedFilter) -> Vec<FilterEntry> {
        self.remove_where(|e| same_filter(&e.filter, filter))
    }

    /// Remove every entry registered by `owner`.
    pub fn remove_owned_by(&mut self, owner: &str) -> Vec<FilterEntry> {
        self.remove_where(|e| e.owner == owner)
    }

    /// Remove this filter instance's entry under exactly `spec`.
    pub fn remove_at(&mut self, spec: &PathSpec, filter: &SharedFilter) -> Vec<FilterEntry> {
        self.remove_where(|e| e.spec == *spec && same_filter(&e.filter, filter))
    }

    /// Remove everything.
    pub fn clear(&mut self) -> Vec<FilterEntry> {
        self.remove_where(|_| true)
    }

    fn remove_where<F>(&mut self, pred: F) -> Vec<FilterEntry>
    where
        F: Fn(&FilterEntry) -> bool,
    {
        let mut removed = Vec::new();
        let mut drain = |bucket: &mut Vec<FilterEntry>| {
            let mut kept = Vec::with_capacity(bucket.len());
            for entry in bucket.drain(..) {
                if pred(&entry) {
                    removed.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *bucket = kept;
        };

        drain(&mut self.global);
        for bucket in self.prefix.values_mut() {
            drain(bucket);
        }
        for bucket in self.exact.values_mut() {
            drain(bucket);
        }
        self.prefix.retain(|_, v| !v.is_empty());
        self.exact.retain(|_, v| !v.is_empty());
        removed
    }

    /// Ordered filter list for a request path.
    pub fn build_chain_for(&self, path: &str, priority: &FilterPriority) -> Vec<SharedFilter> {
        let mut chain: Vec<SharedFilter> = Vec::new();
        let mut push = |filter: &SharedFilter| {
            if !chain.iter().any(|f| same_filter(f, filter)) {
                chain.push(filter.clone());
            }
        };

        for entry in &self.global {
            push(&entry.filter);
        }

        if !self.prefix.is_empty() {
            let mut current = Some(path.to_string());
            while let Some(prefix) = current {
                if let Some(bucket) = self.prefix.get(&prefix) {
                    for entry in bucket {
                        push(&entry.filter);
                    }
                }
                current = parent_alias(&prefix);
            }
        }

        if let Some(bucket) = self.exact.get(path) {
            for entry in bucket {
                push(&entry.filter);
            }
        }

        priority.sort(&mut chain);
        chain
    }

    /// All entries in classification order.
    pub fn entries(&self) -> Vec<FilterInfo> {
        let mut keyed: Vec<&FilterEntry> = self.prefix.values().flatten().collect();
        keyed.extend(self.exact.values().flatten());
        keyed.sort_by(|a, b| a.spec.pattern().cmp(&b.spec.pattern()));

        self.global
            .iter()
            .chain(keyed)
            .map(|e| FilterInfo {
                name: e.filter.name().to_string(),
                pattern: e.spec.pattern(),
                owner: e.owner.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.global.len()
            + self.prefix.values().map(Vec::len).sum::<usize>()
            + self.exact.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide filter registry.
///
/// Chain building reads the current snapshot; mutations require the
/// structural lock.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    snapshot: ArcSwap<FilterIndex>,
    priority: FilterPriority,
}

impl FilterRegistry {
    pub fn new(priority: FilterPriority) -> Self {
        Self {
            snapshot: ArcSwap::default(),
            priority,
        }
    }

    pub fn load(&self) -> Arc<FilterIndex> {
        self.snapshot.load_full()
    }

    pub fn priority(&self) -> &FilterPriority {
        &self.priority
    }

    /// Returns `false` for a duplicate registration, leaving the index as is.
    pub fn insert(&self, _held: &mut Structure, filter: SharedFilter, spec: PathSpec, owner: &str) -> bool {
        let mut next = FilterIndex::clone(&self.snapshot.load());
        if !next.insert(filter, spec, owner) {
            return false;
        }
        self.snapshot.store(Arc::new(next));
        true
    }

    pub fn remove(&self, _held: &mut Structure, filter: &SharedFilter) -> Vec<FilterEntry> {
        self.update(|index| index.remove(filter))
    }

    pub fn remove_owned_by(&self, _held: &mut Structure, owner: &str) -> Vec<FilterEntry> {
        self.update(|index| index.remove_owned_by(owner))
    }

    pub fn remove_at(&self, _held: &mut Structure, spec: &PathSpec, filter: &SharedFilter) -> Vec<FilterEntry> {
        self.update(|index| index.remove_at(spec, filter))
    }

    pub fn clear(&self, _held: &mut Structure) -> Vec<FilterEntry> {
        self.update(FilterIndex::clear)
    }

    fn update<F>(&self, op: F) -> Vec<FilterEntry>
    where
        F: FnOnce(&mut FilterIndex) -> Vec<FilterEntry>,
    {
        let mut next = FilterIndex::clone(&self.snapshot.load());
        let removed = op(&mut next);
        if !removed.is_empty() {
            self.snapshot.store(Arc::new(next));
        }
        removed
    }

    pub fn build_chain_for(&self, path: &str) -> Vec<SharedFilter> {
        self.snapshot.load().build_chain_for(path, &self.priority)
    }
}

/// Distinct filter instances among `entries`, in first-seen order.
pub fn distinct_filters(entries: &[FilterEntry]) -> Vec<SharedFilter> {
    let mut out: Vec<SharedFilter> = Vec::new();
    for entry in entries {
        if !out.iter().any(|f| same_filter(f, &entry.filter)) {
            out.push(entry.filter.clone());
        }
    }
    out
}

//! Registration table.
//!
//! # Responsibilities
//! - Map alias → handler slot, ordered for prefix search
//! - Track which aliases each registrant owns
//! - Publish every change as a new immutable snapshot
//!
//! # Design Decisions
//! - Readers load the current snapshot without locking (arc-swap); a change
//!   is either fully visible or fully invisible to a dispatch
//! - Writers must hold the structural lock, proven by `&mut Structure`
//! - Detaching a slot only unpublishes it; draining and destroying happen
//!   after the structural lock is released

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::RegistrationError;
use crate::routing::alias::validate_alias;
use crate::routing::slot::HandlerSlot;

/// State only touched while the structural lock is held.
#[derive(Debug, Default)]
pub struct Structure {
    owners: HashMap<String, BTreeSet<String>>,
}

impl Structure {
    /// Aliases registered by `owner`.
    pub fn owned_by(&self, owner: &str) -> Vec<String> {
        self.owners
            .get(owner)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn owns(&self, owner: &str, alias: &str) -> bool {
        self.owners.get(owner).is_some_and(|set| set.contains(alias))
    }

    fn add(&mut self, owner: &str, alias: &str) {
        self.owners
            .entry(owner.to_string())
            .or_default()
            .insert(alias.to_string());
    }

    fn remove(&mut self, owner: &str, alias: &str) {
        if let Some(set) = self.owners.get_mut(owner) {
            set.remove(alias);
            if set.is_empty() {
                self.owners.remove(owner);
            }
        }
    }
}

/// One immutable version of the alias map.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    slots: BTreeMap<String, Arc<HandlerSlot>>,
}

impl AliasTable {
    pub fn get(&self, alias: &str) -> Option<&Arc<HandlerSlot>> {
        self.slots.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.slots.contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All aliases in lexical order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Arc<HandlerSlot>> {
        self.slots.values()
    }

    /// The prefix itself and every alias below it, in lexical order.
    pub fn aliases_under(&self, prefix: &str) -> Vec<&str> {
        if prefix.is_empty() || prefix == "/" {
            return self.aliases().collect();
        }
        let below = format!("{}/", prefix.trim_end_matches('/'));
        let base = prefix.trim_end_matches('/');
        self.slots
            .range::<str, _>((Bound::Included(base), Bound::Unbounded))
            .map(|(k, _)| k.as_str())
            .take_while(|k| k.starts_with(base))
            .filter(|k| *k == base || k.starts_with(&below))
            .collect()
    }
}

/// The process-wide alias table.
#[derive(Debug, Default)]
pub struct RegistrationTable {
    snapshot: ArcSwap<AliasTable>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<AliasTable> {
        self.snapshot.load_full()
    }

    /// Exact lookup against the current snapshot.
    pub fn lookup(&self, alias: &str) -> Option<Arc<HandlerSlot>> {
        self.snapshot.load().get(alias).cloned()
    }

    /// Check alias syntax and uniqueness.
    pub fn check_available(&self, _held: &Structure, alias: &str) -> Result<(), RegistrationError> {
        validate_alias(alias)?;
        if self.snapshot.load().contains(alias) {
            return Err(RegistrationError::conflict(alias, "alias already registered"));
        }
        Ok(())
    }

    /// Publish a slot under its alias.
    pub fn insert(&self, held: &mut Structure, slot: Arc<HandlerSlot>) -> Result<(), RegistrationError> {
        self.check_available(held, slot.alias())?;

        let mut next = AliasTable::clone(&self.snapshot.load());
        held.add(slot.owner(), slot.alias());
        next.slots.insert(slot.alias().to_string(), slot);
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// Unpublish `alias` on behalf of `owner`.
    pub fn detach(
        &self,
        held: &mut Structure,
        alias: &str,
        owner: &str,
    ) -> Result<Arc<HandlerSlot>, RegistrationError> {
        if !held.owns(owner, alias) {
            return Err(RegistrationError::NotOwner {
                alias: alias.to_string(),
                owner: owner.to_string(),
            });
        }

        let mut next = AliasTable::clone(&self.snapshot.load());
        held.remove(owner, alias);
        let slot = next.slots.remove(alias).ok_or_else(|| RegistrationError::NotOwner {
            alias: alias.to_string(),
            owner: owner.to_string(),
        })?;
        self.snapshot.store(Arc::new(next));
        Ok(slot)
    }

    /// Unpublish every alias owned by `owner`, bypassing the ownership check.
    pub fn detach_all_owned_by(&self, held: &mut Structure, owner: &str) -> Vec<Arc<HandlerSlot>> {
        let aliases = held.owned_by(owner);
        if aliases.is_empty() {
            return Vec::new();
        }

        let mut next = AliasTable::clone(&self.snapshot.load());
        let mut detached = Vec::with_capacity(aliases.len());
        for alias in &aliases {
            if let Some(slot) = next.slots.remove(alias) {
                detached.push(slot);
            }
        }
        held.owners.remove(owner);
        self.snapshot.store(Arc::new(next));
        detached
    }

    /// Unpublish everything.
    pub fn detach_all(&self, held: &mut Structure) -> Vec<Arc<HandlerSlot>> {
        let previous = self.snapshot.swap(Arc::new(AliasTable::default()));
        held.owners.clear();
        previous.slots().cloned().collect()
    }
}

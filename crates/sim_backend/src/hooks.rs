//! # Hook Engine
//!
//! Hooks are named, toggleable modifiers applied to a live entity. Activating a
//! hook runs its `on_activate` once and keeps the [`Reversal`] it hands back;
//! deactivating runs that reversal exactly once. Activating an already active
//! hook does nothing, so a hook never stacks on itself.
//!
//! State per (entity, hook) pair:
//!
//! ```text
//! Inactive --register--> Active --unregister / entity destroyed--> Inactive
//! ```
//!
//! Each pair has its own guard, so concurrent register/unregister calls for the
//! same pair are serialized while unrelated pairs proceed independently. The
//! guard is reentrant: a hook may destroy its own entity from `on_activate` or
//! from its reversal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use thiserror::Error;

use crate::components::{Entity, EntityId};

/// What a hook leaves behind when it activates
pub enum Reversal {
    /// Nothing to undo: the hook declined to apply or had no lasting effect
    NoEffect,
    /// Action that undoes the hook's effect
    Undo(Box<dyn FnOnce() + Send>),
}

impl Reversal {
    pub fn undo<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::Undo(Box::new(action))
    }

    pub fn has_effect(&self) -> bool {
        matches!(self, Self::Undo(_))
    }

    fn run(self) {
        if let Self::Undo(action) = self {
            action();
        }
    }
}

impl fmt::Debug for Reversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEffect => f.write_str("NoEffect"),
            Self::Undo(_) => f.write_str("Undo(..)"),
        }
    }
}

/// A reversible modifier that can be toggled on an entity
///
/// Reversals may run while the entity is being torn down; they should hold
/// weak or shared handles to whatever they mutate and check them first.
pub trait Hook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply the hook. Returning [`Reversal::NoEffect`] means the hook declined
    /// (for example because a required component is missing); it is not an error.
    fn on_activate(&self, entity: &Arc<Entity>) -> Reversal;
}

/// Errors that can occur while registering hooks or toggling them
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook already registered: {0}")]
    DuplicateName(&'static str),

    #[error("Unknown hook: {0}")]
    UnknownHook(String),

    #[error("Entity {0} has been destroyed")]
    EntityDestroyed(EntityId),
}

type HookKey = (EntityId, &'static str);

/// Registration state of one (entity, hook) pair
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Inactive,
    /// `on_activate` is running; only the registering call may finish it
    Activating,
    Active(Reversal),
}

impl Slot {
    fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Take the stored reversal, leaving `Inactive`. Other states are left untouched.
    fn take_active(&mut self) -> Option<Reversal> {
        match std::mem::take(self) {
            Self::Active(reversal) => Some(reversal),
            other => {
                *self = other;
                None
            }
        }
    }
}

/// Reentrant so hook callbacks may destroy the entity or toggle hooks on the
/// same thread. The `RefCell` is never borrowed across a callback.
type HookSlot = Arc<ReentrantMutex<RefCell<Slot>>>;

fn new_slot() -> HookSlot {
    Arc::new(ReentrantMutex::new(RefCell::new(Slot::Inactive)))
}

fn slot_is_active(slot: &HookSlot) -> bool {
    let guard = slot.lock();
    let active = guard.borrow().is_active();
    active
}

/// Process-wide table of hook descriptors and active registrations
pub struct HookEngine {
    hooks: RwLock<HashMap<&'static str, Arc<dyn Hook>>>,
    active: DashMap<HookKey, HookSlot>,
}

impl HookEngine {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
            active: DashMap::new(),
        }
    }

    /// Make a hook available by name
    pub fn add_hook(&self, hook: Arc<dyn Hook>) -> Result<(), HookError> {
        let name = hook.name();
        let mut hooks = self.hooks.write();

        if hooks.contains_key(name) {
            return Err(HookError::DuplicateName(name));
        }

        hooks.insert(name, hook);
        tracing::debug!("Registered hook: {}", name);
        Ok(())
    }

    /// Make every hook in `source` available
    pub fn configure<I>(&self, source: I) -> Result<(), HookError>
    where
        I: IntoIterator<Item = Arc<dyn Hook>>,
    {
        for hook in source {
            self.add_hook(hook)?;
        }
        Ok(())
    }

    fn hook(&self, name: &str) -> Result<Arc<dyn Hook>, HookError> {
        self.hooks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HookError::UnknownHook(name.to_string()))
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.hooks.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Activate `hook_name` on `entity`. Does nothing if it is already active
    /// or is being activated further up the current call stack.
    pub fn register(&self, entity: &Arc<Entity>, hook_name: &str) -> Result<(), HookError> {
        let hook = self.hook(hook_name)?;

        if !entity.is_alive() {
            return Err(HookError::EntityDestroyed(entity.id()));
        }

        let key = (entity.id(), hook.name());
        let slot = self.active.entry(key).or_insert_with(new_slot).clone();
        let guard = slot.lock();

        {
            let mut state = guard.borrow_mut();
            if !matches!(*state, Slot::Inactive) {
                tracing::trace!("Hook {} already active on {}", hook.name(), entity.id());
                return Ok(());
            }
            *state = Slot::Activating;
        }

        let reversal = hook.on_activate(entity);
        if !reversal.has_effect() {
            tracing::debug!("Hook {} declined on {}", hook.name(), entity.id());
        }

        // Destruction may have started while the hook was applying; revert right away
        if !entity.is_alive() {
            tracing::debug!("Entity {} destroyed during {} activation", entity.id(), hook.name());
            *guard.borrow_mut() = Slot::Inactive;
            self.active
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
            reversal.run();
            return Err(HookError::EntityDestroyed(entity.id()));
        }

        *guard.borrow_mut() = Slot::Active(reversal);
        tracing::debug!("Hook {} active on {}", hook.name(), entity.id());
        Ok(())
    }

    /// Deactivate `hook_name` on `entity`, running its reversal once. Does nothing if inactive.
    pub fn unregister(&self, entity: &Entity, hook_name: &str) -> Result<(), HookError> {
        let hook = self.hook(hook_name)?;

        let Some(slot) = self
            .active
            .get(&(entity.id(), hook.name()))
            .map(|entry| entry.value().clone())
        else {
            return Ok(());
        };

        // Reverted under the slot guard so a concurrent register sees the effect gone
        let guard = slot.lock();
        let reversal = guard.borrow_mut().take_active();
        if let Some(reversal) = reversal {
            reversal.run();
            tracing::debug!("Hook {} removed from {}", hook.name(), entity.id());
        }
        Ok(())
    }

    /// Activate or deactivate a hook
    pub fn set(&self, entity: &Arc<Entity>, hook_name: &str, enabled: bool) -> Result<(), HookError> {
        if enabled {
            self.register(entity, hook_name)
        } else {
            self.unregister(entity, hook_name)
        }
    }

    fn slots_for(&self, entity: EntityId) -> Vec<(&'static str, HookSlot)> {
        // Slot guards are only taken after the map guards are released
        self.active
            .iter()
            .filter(|entry| entry.key().0 == entity)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect()
    }

    pub fn is_active(&self, entity: EntityId, hook_name: &str) -> bool {
        self.slots_for(entity)
            .into_iter()
            .any(|(name, slot)| name == hook_name && slot_is_active(&slot))
    }

    /// Names of the hooks currently active on `entity`
    pub fn active_hooks(&self, entity: EntityId) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .slots_for(entity)
            .into_iter()
            .filter(|(_, slot)| slot_is_active(slot))
            .map(|(name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Revert every active hook on `entity` and forget its slots. Returns how many were reverted.
    ///
    /// A slot still `Activating` belongs to a `register` further up this thread's
    /// stack; that call sees the entity is gone and reverts on its own.
    pub(crate) fn unregister_all(&self, entity: EntityId) -> usize {
        let keys: Vec<HookKey> = self
            .active
            .iter()
            .filter(|entry| entry.key().0 == entity)
            .map(|entry| *entry.key())
            .collect();

        let mut reverted = 0;
        for key in keys {
            let Some((_, slot)) = self.active.remove(&key) else {
                continue;
            };
            let guard = slot.lock();
            let reversal = guard.borrow_mut().take_active();
            if let Some(reversal) = reversal {
                reversal.run();
                reverted += 1;
            }
        }
        reverted
    }

    #[cfg(test)]
    fn slot_count(&self, entity: EntityId) -> usize {
        self.slots_for(entity).len()
    }
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}

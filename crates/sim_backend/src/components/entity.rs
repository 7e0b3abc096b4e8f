use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{as_any, Component, ComponentError, ComponentKind, EntityContext};
use crate::hooks::HookEngine;

const ALIVE: u8 = 0;
const DESTROYING: u8 = 1;
const DESTROYED: u8 = 2;

/// Opaque entity identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component instance attached to an entity, kept both as its lifecycle
/// interface and as `Any` for typed lookup.
#[derive(Clone)]
pub struct AttachedComponent {
    name: &'static str,
    instance: Arc<dyn Component>,
    any: Arc<dyn Any + Send + Sync>,
}

impl AttachedComponent {
    pub fn new<T: ComponentKind>(instance: T) -> Self {
        let instance = Arc::new(instance);
        Self {
            name: T::NAME,
            any: as_any(instance.clone()),
            instance,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instance(&self) -> &Arc<dyn Component> {
        &self.instance
    }
}

pub(crate) type LiveEntities = DashMap<EntityId, Arc<Entity>>;

/// Per-actor container: identity, components in dependency order, and the
/// construction context.
pub struct Entity {
    id: EntityId,
    archetype: String,
    context: EntityContext,
    components: RwLock<Vec<AttachedComponent>>,
    state: AtomicU8,
    hooks: Arc<HookEngine>,
    live: Weak<LiveEntities>,
}

impl Entity {
    pub(crate) fn new(
        archetype: &str,
        context: EntityContext,
        hooks: Arc<HookEngine>,
        live: Weak<LiveEntities>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            archetype: archetype.to_string(),
            context,
            components: RwLock::new(Vec::new()),
            state: AtomicU8::new(ALIVE),
            hooks,
            live,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn archetype(&self) -> &str {
        &self.archetype
    }

    pub fn context(&self) -> &EntityContext {
        &self.context
    }

    /// `false` once destruction has begun
    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) == ALIVE
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DESTROYED
    }

    pub(crate) fn attach(&self, component: AttachedComponent) {
        self.components.write().push(component);
    }

    fn find(&self, name: &str) -> Option<AttachedComponent> {
        if self.is_destroyed() {
            return None;
        }
        self.components
            .read()
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Dynamic lookup by component name. `None` if the archetype never listed it
    /// or the entity has been destroyed.
    pub fn get_component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.find(name).map(|c| c.instance)
    }

    /// Typed lookup for call sites that know the component kind
    pub fn component<T: ComponentKind>(&self) -> Option<Arc<T>> {
        self.find(T::NAME).and_then(|c| c.any.downcast::<T>().ok())
    }

    /// Typed lookup that reports a missing component as an error, for use inside `create`
    pub fn require<T: ComponentKind>(&self) -> Result<Arc<T>, ComponentError> {
        self.component::<T>()
            .ok_or(ComponentError::MissingComponent(T::NAME))
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Attached component names in dependency order
    pub fn component_names(&self) -> Vec<&'static str> {
        if self.is_destroyed() {
            return Vec::new();
        }
        self.components.read().iter().map(|c| c.name).collect()
    }

    fn snapshot(&self) -> Vec<AttachedComponent> {
        self.components.read().clone()
    }

    /// Run every component's periodic update in dependency order
    pub fn update(&self, delta_time: f32) {
        if !self.is_alive() {
            return;
        }
        for component in self.snapshot() {
            component.instance.update(delta_time);
        }
    }

    /// Tear the entity down: active hooks are reverted first, then components are
    /// destroyed in reverse dependency order. Calling this again is a no-op.
    pub fn destroy(&self) {
        if self
            .state
            .compare_exchange(ALIVE, DESTROYING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Entity {} already destroyed", self.id);
            return;
        }

        let reverted = self.hooks.unregister_all(self.id);

        // Components may look up siblings from `destroy`, so no lock is held while it runs
        let components = self.snapshot();
        for component in components.iter().rev() {
            component.instance.destroy();
        }

        self.components.write().clear();
        self.state.store(DESTROYED, Ordering::Release);

        if let Some(live) = self.live.upgrade() {
            live.remove(&self.id);
        }

        tracing::debug!(
            "Destroyed entity {} ({}): {} components, {} hooks reverted",
            self.id,
            self.archetype,
            components.len(),
            reverted
        );
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("archetype", &self.archetype)
            .field("components", &self.component_names())
            .field("alive", &self.is_alive())
            .finish()
    }
}

//! Per-entity composition.
//!
//! An archetype names the components an entity is built from. The
//! [`ComponentLoader`] expands an archetype in component dependency order, so a
//! component's `create` can read any sibling it declared as a dependency.

mod context;
mod entity;
mod loader;

pub use context::EntityContext;
pub use entity::{AttachedComponent, Entity, EntityId};
pub use loader::{Archetype, ComponentLoader, ComponentSource, Composition};

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::graph::GraphError;

/// Behaviour shared by every component instance, used by engine-internal code
/// (destruction, periodic updates) that does not know the concrete kind.
pub trait Component: Any + Send + Sync {
    /// Release whatever the component holds. Runs once, in reverse dependency order.
    fn destroy(&self) {}

    /// Periodic update driven by the update subsystem
    fn update(&self, _delta_time: f32) {}
}

/// Statically known component kind.
///
/// # Example
///
/// ```ignore
/// struct Modifiers { stats: Arc<Stats> }
///
/// impl Component for Modifiers {}
///
/// impl ComponentKind for Modifiers {
///     const NAME: &'static str = "Modifiers";
///     const DEPENDENCIES: &'static [&'static str] = &["Stats"];
///
///     fn create(entity: &Entity, _context: &EntityContext) -> Result<Self, ComponentError> {
///         let stats = entity.require::<Stats>()?;
///         Ok(Self { stats })
///     }
/// }
/// ```
pub trait ComponentKind: Component + Sized {
    /// Name used by archetypes and dependency lists
    const NAME: &'static str;

    /// Sibling components that must be attached before this one is created
    const DEPENDENCIES: &'static [&'static str] = &[];

    /// Build the component for `entity`. Called at most once per entity.
    fn create(entity: &Entity, context: &EntityContext) -> Result<Self, ComponentError>;

    /// Look this component up on an entity
    fn from_entity(entity: &Entity) -> Option<Arc<Self>> {
        entity.component::<Self>()
    }
}

/// Errors that can occur while configuring the loader or composing entities
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Component loader is already configured")]
    AlreadyConfigured,

    #[error("Component loader has not been configured")]
    NotConfigured,

    #[error("Component already registered: {0}")]
    DuplicateName(&'static str),

    #[error("Archetype '{archetype}' lists unknown component '{component}'")]
    UnknownComponent { archetype: String, component: String },

    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    #[error("Archetype '{archetype}': component '{component}' depends on '{missing}', which the archetype does not list")]
    UnsatisfiedDependency {
        archetype: String,
        component: &'static str,
        missing: &'static str,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Required component missing: {0}")]
    MissingComponent(&'static str),

    #[error("Component creation failed: {0}")]
    CreateFailed(String),

    #[error("Component '{component}' failed to create: {source}")]
    Create {
        component: &'static str,
        #[source]
        source: Box<ComponentError>,
    },
}

pub(crate) fn as_any<T: Any + Send + Sync>(instance: Arc<T>) -> Arc<dyn Any + Send + Sync> {
    instance
}

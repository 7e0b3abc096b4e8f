//! # Sim Backend
//!
//! Lifecycle and composition core for a live simulation of actors and global
//! services.
//!
//! - [`subsystems`]: singleton services and controllers, initialized strictly in
//!   dependency order and then started without blocking each other.
//! - [`components`]: entities built from named archetypes, with components
//!   created in dependency order and destroyed in reverse.
//! - [`hooks`]: idempotent, reversible modifiers toggled on live entities.
//!
//! [`SimBackend`] wires them together:
//!
//! ```ignore
//! let mut backend = SimBackend::builder()
//!     .config(config)
//!     .component::<Stats>()
//!     .component::<Modifiers>()
//!     .archetype("Player", ["Stats", "Modifiers"])
//!     .hook(SpeedBoost)
//!     .subsystem(DataService::new())
//!     .boot(runtime.handle().clone())?;
//!
//! let player = backend.spawn("Player", EntityContext::for_owner(7))?;
//! backend.hooks().register(&player, "SpeedBoost")?;
//! backend.shutdown();
//! ```

pub mod components;
pub mod config;
pub mod graph;
pub mod hooks;
pub mod subsystems;

pub use tokio;

pub use components::{
    Component, ComponentError, ComponentKind, ComponentLoader, ComponentSource, Composition,
    Entity, EntityContext, EntityId,
};
pub use config::{ConfigError, RuntimeConfig, SimConfig};
pub use graph::{DependencyGraph, GraphError};
pub use hooks::{Hook, HookEngine, HookError, Reversal};
pub use subsystems::{
    HandleRegistry, StartFuture, Subsystem, SubsystemContext, SubsystemError, SubsystemId,
    SubsystemRegistry, SubsystemState, UpdateClock, UpdateSystem, UPDATE_SUBSYSTEM_ID,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;

/// Errors that abort [`SimBackendBuilder::boot`]
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Subsystem(#[from] SubsystemError),
}

/// Collects everything the backend is composed of, then boots it
pub struct SimBackendBuilder {
    config: SimConfig,
    components: ComponentSource,
    archetypes: BTreeMap<String, Vec<String>>,
    hooks: Vec<Arc<dyn Hook>>,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl SimBackendBuilder {
    fn new() -> Self {
        Self {
            config: SimConfig::default(),
            components: ComponentSource::new(),
            archetypes: BTreeMap::new(),
            hooks: Vec::new(),
            subsystems: Vec::new(),
        }
    }

    /// Archetypes declared in the config are merged with the builder's; the builder wins on a name clash.
    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn component<T: ComponentKind>(mut self) -> Self {
        self.components.add::<T>();
        self
    }

    pub fn archetype<I, S>(mut self, name: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archetypes
            .insert(name.into(), components.into_iter().map(Into::into).collect());
        self
    }

    pub fn hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn subsystem<S: Subsystem + 'static>(mut self, subsystem: S) -> Self {
        self.subsystems.push(Box::new(subsystem));
        self
    }

    /// Configure hooks and components, then load, init and start every subsystem.
    ///
    /// The update loop is registered automatically. If any `init` fails, the
    /// subsystems that did initialize are stopped before the error is returned.
    pub fn boot(self, runtime: Handle) -> Result<SimBackend, BootError> {
        let _span = tracing::info_span!("boot").entered();

        let hooks = Arc::new(HookEngine::new());
        hooks.configure(self.hooks)?;

        let mut archetypes = self.config.archetypes.clone();
        archetypes.extend(self.archetypes);

        let components = Arc::new(ComponentLoader::new(hooks.clone()));
        components.configure(Composition {
            components: self.components,
            archetypes,
        })?;
        components.validate()?;

        let context = SubsystemContext::with_composition(runtime, components, hooks);

        let update = UpdateSystem::new(self.config.tick_rate);
        let clock = update.clock();

        let mut registry = SubsystemRegistry::new();
        registry.register(update)?;
        registry.load_all(self.subsystems)?;

        if let Err(e) = registry.init_all(&context) {
            registry.stop_all();
            return Err(e.into());
        }
        registry.start_all(&context)?;

        tracing::info!(
            "Sim backend booted: {} subsystems, {} hooks",
            registry.len(),
            context.hooks.hook_names().len()
        );

        Ok(SimBackend {
            config: self.config,
            context,
            subsystems: registry,
            clock,
        })
    }
}

/// A booted backend
pub struct SimBackend {
    config: SimConfig,
    context: SubsystemContext,
    subsystems: SubsystemRegistry,
    clock: Arc<UpdateClock>,
}

impl SimBackend {
    pub fn builder() -> SimBackendBuilder {
        SimBackendBuilder::new()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn context(&self) -> &SubsystemContext {
        &self.context
    }

    pub fn components(&self) -> &Arc<ComponentLoader> {
        &self.context.components
    }

    pub fn hooks(&self) -> &Arc<HookEngine> {
        &self.context.hooks
    }

    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.context.handles
    }

    pub fn subsystems(&self) -> &SubsystemRegistry {
        &self.subsystems
    }

    pub fn clock(&self) -> &Arc<UpdateClock> {
        &self.clock
    }

    /// Build an entity from a configured archetype
    pub fn spawn(
        &self,
        archetype: &str,
        context: EntityContext,
    ) -> Result<Arc<Entity>, ComponentError> {
        self.context.components.create_entity(archetype, context)
    }

    /// Stop every subsystem in reverse order, then destroy the entities still alive.
    /// Returns the stop failures, which never prevent the rest of the shutdown.
    pub fn shutdown(&mut self) -> Vec<SubsystemError> {
        let _span = tracing::info_span!("shutdown").entered();
        let failures = self.subsystems.stop_all();
        let destroyed = self.context.components.destroy_all();
        tracing::info!("Sim backend shut down ({} entities destroyed)", destroyed);
        failures
    }
}

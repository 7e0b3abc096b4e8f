//! Subsystem Framework
//!
//! Provides a trait-based framework for process-wide singleton subsystems with:
//! - Dependency declaration and resolution (topological sort via [`DependencyGraph`])
//! - Three-phase lifecycle: init (strict, synchronous), start (launch-ordered), stop (reverse)
//! - Exactly one registered instance per [`SubsystemId`]
//! - Shared context for the runtime handle, typed handles and the composition engine
//!
//! # Init versus Start
//!
//! `init_all` runs every `init` to completion before the next one begins, so a
//! subsystem may rely on anything its dependencies set up during their `init`.
//! `start_all` only orders the *launches*: each `start` future is spawned and
//! the loader moves on immediately. A subsystem's start routine therefore must
//! not assume a dependency's start routine has produced any effect yet, only
//! that the dependency finished `init`. Start work is often an indefinite
//! event loop (waiting for players to join), and holding the boot sequence on
//! it would stall every later subsystem.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::components::ComponentLoader;
use crate::graph::{DependencyGraph, GraphError};
use crate::hooks::HookEngine;

/// Unique identifier for a subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsystemId(&'static str);

impl SubsystemId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Lifecycle state of a registered subsystem. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    Registered,
    Initialized,
    Started,
    Stopped,
}

/// Future returned by [`Subsystem::start`]; spawned, never awaited by the loader
pub type StartFuture = BoxFuture<'static, Result<(), SubsystemError>>;

/// Shared context provided to all subsystems during init and start
#[derive(Clone)]
pub struct SubsystemContext {
    /// Tokio runtime handle used to launch start routines
    pub runtime: Handle,
    /// Typed handles published by subsystems for their dependents
    pub handles: Arc<HandleRegistry>,
    /// Archetype-driven entity construction
    pub components: Arc<ComponentLoader>,
    /// Reversible per-entity modifiers
    pub hooks: Arc<HookEngine>,
}

impl SubsystemContext {
    /// Context with an empty composition engine (useful for subsystems that never touch entities)
    pub fn new(runtime: Handle) -> Self {
        let hooks = Arc::new(HookEngine::new());
        let components = Arc::new(ComponentLoader::new(hooks.clone()));
        Self::with_composition(runtime, components, hooks)
    }

    pub fn with_composition(
        runtime: Handle,
        components: Arc<ComponentLoader>,
        hooks: Arc<HookEngine>,
    ) -> Self {
        Self {
            runtime,
            handles: Arc::new(HandleRegistry::new()),
            components,
            hooks,
        }
    }
}

/// Registry of typed handles, one per Rust type.
///
/// A subsystem publishes its shareable state during `init`; a dependent resolves
/// it once during its own `init`, which the init ordering guarantees runs later.
pub struct HandleRegistry {
    handles: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Publish a handle. Returns `false` if a handle of this type was already published
    /// (the existing one is kept).
    pub fn publish<T: Send + Sync + 'static>(&self, handle: Arc<T>) -> bool {
        match self.handles.entry(TypeId::of::<T>()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!(
                    "Handle {} already published, keeping the first one",
                    std::any::type_name::<T>()
                );
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Resolve a previously published handle
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.handles
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during subsystem operations
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("Subsystem initialization failed: {0}")]
    InitFailed(String),

    #[error("Subsystem start failed: {0}")]
    StartFailed(String),

    #[error("Subsystem shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("Subsystem already registered: {0}")]
    AlreadyRegistered(&'static str),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Subsystem '{subsystem}' failed to initialize: {source}")]
    Init {
        subsystem: &'static str,
        #[source]
        source: Box<SubsystemError>,
    },

    #[error("Subsystem '{subsystem}' failed to stop: {source}")]
    Stop {
        subsystem: &'static str,
        #[source]
        source: Box<SubsystemError>,
    },

    #[error("{0} requires every subsystem to be initialized")]
    NotInitialized(&'static str),
}

/// Trait that all subsystems (services and controllers) must implement
///
/// # Example
///
/// ```ignore
/// struct MatchService {
///     profiles: Option<Arc<ProfileStore>>,
/// }
///
/// impl Subsystem for MatchService {
///     fn id(&self) -> SubsystemId {
///         SubsystemId::new("match")
///     }
///
///     fn dependencies(&self) -> Vec<SubsystemId> {
///         vec![DATA_SERVICE]
///     }
///
///     fn init(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
///         self.profiles = context.handles.resolve::<ProfileStore>();
///         Ok(())
///     }
///
///     fn start(&mut self, _context: &SubsystemContext) -> Option<StartFuture> {
///         Some(Box::pin(async move {
///             // Wait for players, run rounds...
///             Ok(())
///         }))
///     }
/// }
/// ```
pub trait Subsystem: Send + Sync {
    /// Unique identifier for this subsystem
    fn id(&self) -> SubsystemId;

    /// Subsystems whose `init` must complete before this one's begins
    fn dependencies(&self) -> Vec<SubsystemId>;

    /// Construct internal state. Runs synchronously, strictly after every dependency's `init`.
    fn init(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError>;

    /// Launch steady-state work. The returned future is spawned, not awaited.
    fn start(&mut self, _context: &SubsystemContext) -> Option<StartFuture> {
        None
    }

    /// Release resources. Called in reverse init order.
    fn stop(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct RegisteredSubsystem {
    subsystem: Box<dyn Subsystem>,
    state: SubsystemState,
    task: Option<JoinHandle<()>>,
}

/// Registry for managing subsystems with dependency resolution
pub struct SubsystemRegistry {
    subsystems: HashMap<SubsystemId, RegisteredSubsystem>,
    registration_order: Vec<SubsystemId>,
    init_order: Vec<SubsystemId>,
    initialized: bool,
    started: bool,
}

impl SubsystemRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            subsystems: HashMap::new(),
            registration_order: Vec::new(),
            init_order: Vec::new(),
            initialized: false,
            started: false,
        }
    }

    /// Register a subsystem (must be done before init_all)
    pub fn register<S: Subsystem + 'static>(&mut self, subsystem: S) -> Result<(), SubsystemError> {
        self.insert(Box::new(subsystem))
    }

    /// Register every subsystem from a source collection.
    ///
    /// Duplicate ids are rejected before anything from the batch is registered.
    pub fn load_all<I>(&mut self, source: I) -> Result<(), SubsystemError>
    where
        I: IntoIterator<Item = Box<dyn Subsystem>>,
    {
        let batch: Vec<Box<dyn Subsystem>> = source.into_iter().collect();

        let mut seen: Vec<SubsystemId> = Vec::with_capacity(batch.len());
        for subsystem in &batch {
            let id = subsystem.id();
            if seen.contains(&id) || self.subsystems.contains_key(&id) {
                return Err(SubsystemError::AlreadyRegistered(id.as_str()));
            }
            seen.push(id);
        }

        for subsystem in batch {
            self.insert(subsystem)?;
        }

        tracing::debug!("Loaded {} subsystems", seen.len());
        Ok(())
    }

    fn insert(&mut self, subsystem: Box<dyn Subsystem>) -> Result<(), SubsystemError> {
        let id = subsystem.id();

        if self.subsystems.contains_key(&id) {
            return Err(SubsystemError::AlreadyRegistered(id.as_str()));
        }

        self.subsystems.insert(
            id,
            RegisteredSubsystem {
                subsystem,
                state: SubsystemState::Registered,
                task: None,
            },
        );
        self.registration_order.push(id);
        Ok(())
    }

    fn graph(&self) -> Result<DependencyGraph<SubsystemId>, SubsystemError> {
        let mut graph = DependencyGraph::new();
        for id in &self.registration_order {
            let deps = self.subsystems[id].subsystem.dependencies();
            graph.add_node(*id, &deps)?;
        }
        Ok(graph)
    }

    /// Resolve dependencies using topological sort
    ///
    /// Returns initialization order that respects all dependencies
    pub fn resolve_dependencies(&self) -> Result<Vec<SubsystemId>, SubsystemError> {
        Ok(self.graph()?.sort()?)
    }

    /// Initialize all subsystems in dependency order.
    ///
    /// The first failing `init` aborts the sequence. Subsystems initialized before
    /// the failure stay initialized; `stop_all` will still stop them.
    pub fn init_all(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
        if self.initialized {
            tracing::warn!("SubsystemRegistry already initialized, skipping");
            return Ok(());
        }

        let _span = tracing::info_span!("init_all").entered();

        // Resolve initialization order
        let order = self.resolve_dependencies()?;
        tracing::info!("Subsystem initialization order: {:?}",
            order.iter().map(|id| id.as_str()).collect::<Vec<_>>());
        self.init_order = order.clone();

        for id in &order {
            let Some(entry) = self.subsystems.get_mut(id) else {
                continue;
            };
            if entry.state != SubsystemState::Registered {
                continue;
            }

            tracing::debug!("Initializing subsystem: {}", id);
            let start = std::time::Instant::now();

            entry.subsystem.init(context).map_err(|e| {
                tracing::error!("Subsystem {} failed to initialize: {}", id, e);
                SubsystemError::Init {
                    subsystem: id.as_str(),
                    source: Box::new(e),
                }
            })?;

            entry.state = SubsystemState::Initialized;
            tracing::debug!("✓ Initialized subsystem: {} ({:?})", id, start.elapsed());
        }

        self.initialized = true;
        tracing::info!("All subsystems initialized successfully");
        Ok(())
    }

    /// Launch every subsystem's start routine in init order without waiting on any of them
    pub fn start_all(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
        if !self.initialized {
            return Err(SubsystemError::NotInitialized("start_all"));
        }
        if self.started {
            tracing::warn!("SubsystemRegistry already started, skipping");
            return Ok(());
        }

        let _span = tracing::info_span!("start_all").entered();

        for id in &self.init_order {
            let Some(entry) = self.subsystems.get_mut(id) else {
                continue;
            };
            if entry.state != SubsystemState::Initialized {
                continue;
            }

            if let Some(routine) = entry.subsystem.start(context) {
                let name = id.as_str();
                entry.task = Some(context.runtime.spawn(async move {
                    match AssertUnwindSafe(routine).catch_unwind().await {
                        Ok(Ok(())) => tracing::debug!("Subsystem {} start routine finished", name),
                        Ok(Err(e)) => {
                            tracing::error!("Subsystem {} start routine failed: {}", name, e)
                        }
                        Err(panic) => tracing::error!(
                            "Subsystem {} start routine panicked: {}",
                            name,
                            panic_message(panic.as_ref())
                        ),
                    }
                }));
                tracing::debug!("Launched subsystem: {}", id);
            }

            entry.state = SubsystemState::Started;
        }

        self.started = true;
        tracing::info!("All subsystems launched");
        Ok(())
    }

    /// Stop every initialized subsystem in reverse init order.
    ///
    /// A failing `stop` is logged and collected; the remaining subsystems are
    /// still stopped. Any start routine still running after its subsystem's
    /// `stop` is aborted.
    pub fn stop_all(&mut self) -> Vec<SubsystemError> {
        let _span = tracing::info_span!("stop_all").entered();
        let mut failures = Vec::new();

        for id in self.init_order.iter().rev() {
            let Some(entry) = self.subsystems.get_mut(id) else {
                continue;
            };
            if !matches!(entry.state, SubsystemState::Initialized | SubsystemState::Started) {
                continue;
            }

            tracing::debug!("Stopping subsystem: {}", id);
            if let Err(e) = entry.subsystem.stop() {
                tracing::error!("Subsystem {} failed to stop: {}", id, e);
                failures.push(SubsystemError::Stop {
                    subsystem: id.as_str(),
                    source: Box::new(e),
                });
            }

            if let Some(task) = entry.task.take() {
                task.abort();
            }
            entry.state = SubsystemState::Stopped;
        }

        self.initialized = false;
        self.started = false;

        if failures.is_empty() {
            tracing::info!("All subsystems stopped successfully");
        } else {
            tracing::warn!("Subsystems stopped with {} failure(s)", failures.len());
        }
        failures
    }

    /// Lifecycle state of a subsystem
    pub fn state(&self, id: SubsystemId) -> Option<SubsystemState> {
        self.subsystems.get(&id).map(|entry| entry.state)
    }

    /// Order computed by the last `init_all`
    pub fn init_order(&self) -> &[SubsystemId] {
        &self.init_order
    }

    /// Get a subsystem by ID (for direct access if needed)
    pub fn get(&self, id: SubsystemId) -> Option<&dyn Subsystem> {
        self.subsystems.get(&id).map(|entry| &*entry.subsystem)
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }

    /// Visualize the subsystem graph as DOT format
    pub fn to_dot(&self) -> Result<String, SubsystemError> {
        Ok(self.graph()?.to_dot("Subsystems"))
    }
}

impl Default for SubsystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::entity::LiveEntities;
use super::{AttachedComponent, ComponentError, ComponentKind, Entity, EntityContext, EntityId};
use crate::graph::DependencyGraph;
use crate::hooks::HookEngine;

type CreateFn = fn(&Entity, &EntityContext) -> Result<AttachedComponent, ComponentError>;

fn create_erased<T: ComponentKind>(
    entity: &Entity,
    context: &EntityContext,
) -> Result<AttachedComponent, ComponentError> {
    T::create(entity, context).map(AttachedComponent::new)
}

/// Type-erased component descriptor
#[derive(Clone, Copy)]
struct ComponentDescriptor {
    name: &'static str,
    dependencies: &'static [&'static str],
    create: CreateFn,
}

impl ComponentDescriptor {
    fn of<T: ComponentKind>() -> Self {
        Self {
            name: T::NAME,
            dependencies: T::DEPENDENCIES,
            create: create_erased::<T>,
        }
    }
}

/// Collection of component kinds available to archetypes
#[derive(Clone, Default)]
pub struct ComponentSource {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: ComponentKind>(mut self) -> Self {
        self.add::<T>();
        self
    }

    pub fn add<T: ComponentKind>(&mut self) {
        self.descriptors.push(ComponentDescriptor::of::<T>());
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Named, fixed list of component kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archetype {
    pub name: String,
    pub components: Vec<&'static str>,
}

/// Everything the loader needs, supplied once during bootstrap
#[derive(Clone, Default)]
pub struct Composition {
    pub components: ComponentSource,
    pub archetypes: BTreeMap<String, Vec<String>>,
}

impl Composition {
    pub fn new(components: ComponentSource) -> Self {
        Self {
            components,
            archetypes: BTreeMap::new(),
        }
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
}

struct Catalog {
    descriptors: HashMap<&'static str, ComponentDescriptor>,
    archetypes: HashMap<String, Archetype>,
}

/// Expands archetypes into entities, building each component in dependency order
pub struct ComponentLoader {
    hooks: Arc<HookEngine>,
    catalog: OnceLock<Catalog>,
    plans: DashMap<String, Arc<[&'static str]>>,
    live: Arc<LiveEntities>,
}

impl ComponentLoader {
    pub fn new(hooks: Arc<HookEngine>) -> Self {
        Self {
            hooks,
            catalog: OnceLock::new(),
            plans: DashMap::new(),
            live: Arc::new(DashMap::new()),
        }
    }

    /// Register component kinds and archetypes. Allowed exactly once, before any entity is created.
    pub fn configure(&self, composition: Composition) -> Result<(), ComponentError> {
        if self.catalog.get().is_some() {
            return Err(ComponentError::AlreadyConfigured);
        }

        let mut descriptors = HashMap::new();
        for descriptor in composition.components.descriptors {
            if descriptors.insert(descriptor.name, descriptor).is_some() {
                return Err(ComponentError::DuplicateName(descriptor.name));
            }
        }

        let mut archetypes = HashMap::new();
        for (name, listed) in composition.archetypes {
            let mut components: Vec<&'static str> = Vec::with_capacity(listed.len());
            for component in &listed {
                let Some(descriptor) = descriptors.get(component.as_str()) else {
                    return Err(ComponentError::UnknownComponent {
                        archetype: name.clone(),
                        component: component.clone(),
                    });
                };
                // One instance per distinct component name
                if !components.contains(&descriptor.name) {
                    components.push(descriptor.name);
                }
            }
            archetypes.insert(name.clone(), Archetype { name, components });
        }

        let component_count = descriptors.len();
        let archetype_count = archetypes.len();

        self.catalog
            .set(Catalog {
                descriptors,
                archetypes,
            })
            .map_err(|_| ComponentError::AlreadyConfigured)?;

        tracing::info!(
            "Component loader configured: {} components, {} archetypes",
            component_count,
            archetype_count
        );
        Ok(())
    }

    fn catalog(&self) -> Result<&Catalog, ComponentError> {
        self.catalog.get().ok_or(ComponentError::NotConfigured)
    }

    pub fn is_configured(&self) -> bool {
        self.catalog.get().is_some()
    }

    pub fn archetype(&self, name: &str) -> Option<&Archetype> {
        self.catalog.get().and_then(|catalog| catalog.archetypes.get(name))
    }

    /// Resolve every archetype's build order, failing on the first invalid one
    pub fn validate(&self) -> Result<(), ComponentError> {
        let catalog = self.catalog()?;
        let mut names: Vec<&String> = catalog.archetypes.keys().collect();
        names.sort();

        for name in names {
            let order = self.plan(name)?;
            tracing::debug!("Archetype {} build order: {:?}", name, order);
        }
        Ok(())
    }

    /// Dependency-respecting build order over only the archetype's own components
    pub fn plan(&self, archetype: &str) -> Result<Arc<[&'static str]>, ComponentError> {
        if let Some(plan) = self.plans.get(archetype) {
            return Ok(plan.clone());
        }

        let catalog = self.catalog()?;
        let archetype = catalog
            .archetypes
            .get(archetype)
            .ok_or_else(|| ComponentError::UnknownArchetype(archetype.to_string()))?;

        let listed: HashSet<&'static str> = archetype.components.iter().copied().collect();
        let mut graph = DependencyGraph::new();

        for name in &archetype.components {
            let descriptor = &catalog.descriptors[name];
            for dep in descriptor.dependencies {
                if !listed.contains(dep) {
                    return Err(ComponentError::UnsatisfiedDependency {
                        archetype: archetype.name.clone(),
                        component: descriptor.name,
                        missing: *dep,
                    });
                }
            }
            graph.add_node(descriptor.name, descriptor.dependencies)?;
        }

        let plan: Arc<[&'static str]> = graph.sort()?.into();
        self.plans.insert(archetype.name.clone(), plan.clone());
        Ok(plan)
    }

    /// Build an entity from a named archetype.
    ///
    /// The archetype is validated before anything is constructed. Each component is
    /// attached as soon as it is created, so later components can read it. If a
    /// `create` fails, the components already attached are destroyed in reverse order.
    pub fn create_entity(
        &self,
        archetype: &str,
        context: EntityContext,
    ) -> Result<Arc<Entity>, ComponentError> {
        let plan = self.plan(archetype)?;
        let catalog = self.catalog()?;

        let entity = Arc::new(Entity::new(
            archetype,
            context,
            self.hooks.clone(),
            Arc::downgrade(&self.live),
        ));

        for name in plan.iter() {
            let descriptor = &catalog.descriptors[name];
            match (descriptor.create)(&entity, entity.context()) {
                Ok(component) => entity.attach(component),
                Err(e) => {
                    tracing::warn!(
                        "Failed to create component {} for archetype {}: {}",
                        name,
                        archetype,
                        e
                    );
                    entity.destroy();
                    return Err(ComponentError::Create {
                        component: descriptor.name,
                        source: Box::new(e),
                    });
                }
            }
        }

        self.live.insert(entity.id(), entity.clone());
        tracing::debug!(
            "Created entity {} from archetype {} ({} components)",
            entity.id(),
            archetype,
            plan.len()
        );
        Ok(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.live.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every live entity
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.live.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Destroy every live entity
    pub fn destroy_all(&self) -> usize {
        let entities = self.entities();
        for entity in &entities {
            entity.destroy();
        }
        if !entities.is_empty() {
            tracing::info!("Destroyed {} live entities", entities.len());
        }
        entities.len()
    }
}

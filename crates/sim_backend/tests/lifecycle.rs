//! End-to-end boot, composition, hooks and shutdown through `SimBackend`.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sim_backend::{
    BootError, Component, ComponentError, ComponentKind, Entity, EntityContext, Hook, Reversal,
    SimBackend, SimConfig, Subsystem, SubsystemContext, SubsystemError, SubsystemId,
    SubsystemState, UPDATE_SUBSYSTEM_ID,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal(context: &EntityContext) -> Option<Journal> {
    context.get::<Journal>().cloned()
}

struct Stats {
    speed: f32,
}

impl Component for Stats {}

impl ComponentKind for Stats {
    const NAME: &'static str = "Stats";

    fn create(_entity: &Entity, _context: &EntityContext) -> Result<Self, ComponentError> {
        Ok(Self { speed: 10.0 })
    }
}

struct States {
    journal: Option<Journal>,
}

impl Component for States {
    fn destroy(&self) {
        if let Some(journal) = &self.journal {
            journal.lock().push("destroy:States".to_string());
        }
    }
}

impl ComponentKind for States {
    const NAME: &'static str = "States";

    fn create(_entity: &Entity, context: &EntityContext) -> Result<Self, ComponentError> {
        Ok(Self {
            journal: journal(context),
        })
    }
}

struct Modifiers {
    saw_stats: bool,
    multipliers: Mutex<BTreeMap<&'static str, f32>>,
    stats: Arc<Stats>,
    journal: Option<Journal>,
}

impl Modifiers {
    fn speed(&self) -> f32 {
        self.stats.speed * self.multipliers.lock().values().product::<f32>()
    }
}

impl Component for Modifiers {
    fn destroy(&self) {
        if let Some(journal) = &self.journal {
            journal.lock().push("destroy:Modifiers".to_string());
        }
    }
}

impl ComponentKind for Modifiers {
    const NAME: &'static str = "Modifiers";
    const DEPENDENCIES: &'static [&'static str] = &["Stats"];

    fn create(entity: &Entity, context: &EntityContext) -> Result<Self, ComponentError> {
        Ok(Self {
            saw_stats: entity.get_component("Stats").is_some(),
            multipliers: Mutex::new(BTreeMap::new()),
            stats: entity.require::<Stats>()?,
            journal: journal(context),
        })
    }
}

struct SpeedBoost;

impl Hook for SpeedBoost {
    fn name(&self) -> &'static str {
        "SpeedBoost"
    }

    fn on_activate(&self, entity: &Arc<Entity>) -> Reversal {
        let Some(modifiers) = entity.component::<Modifiers>() else {
            return Reversal::NoEffect;
        };
        modifiers.multipliers.lock().insert("SpeedBoost", 1.5);

        let modifiers: Weak<Modifiers> = Arc::downgrade(&modifiers);
        Reversal::undo(move || {
            if let Some(modifiers) = modifiers.upgrade() {
                modifiers.multipliers.lock().remove("SpeedBoost");
            }
        })
    }
}

struct Service {
    id: &'static str,
    deps: Vec<SubsystemId>,
    log: Journal,
}

impl Service {
    fn new(id: &'static str, deps: &[&'static str], log: &Journal) -> Self {
        Self {
            id,
            deps: deps.iter().map(|d| SubsystemId::new(*d)).collect(),
            log: log.clone(),
        }
    }
}

impl Subsystem for Service {
    fn id(&self) -> SubsystemId {
        SubsystemId::new(self.id)
    }

    fn dependencies(&self) -> Vec<SubsystemId> {
        self.deps.clone()
    }

    fn init(&mut self, _context: &SubsystemContext) -> Result<(), SubsystemError> {
        self.log.lock().push(format!("init:{}", self.id));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SubsystemError> {
        self.log.lock().push(format!("stop:{}", self.id));
        Ok(())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn boot(log: &Journal) -> SimBackend {
    SimBackend::builder()
        .component::<Stats>()
        .component::<States>()
        .component::<Modifiers>()
        .archetype("Player", ["Stats", "States", "Modifiers"])
        .hook(SpeedBoost)
        .subsystem(Service::new("c", &["b"], log))
        .subsystem(Service::new("a", &[], log))
        .subsystem(Service::new("b", &["a"], log))
        .boot(tokio::runtime::Handle::current())
        .unwrap()
}

fn lines(log: &Journal, prefix: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter_map(|line| line.strip_prefix(prefix).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_boots_and_stops_services_in_dependency_order() {
    let log = Journal::default();
    let mut backend = boot(&log);

    assert_eq!(lines(&log, "init:"), vec!["a", "b", "c"]);
    assert_eq!(
        backend.subsystems().state(SubsystemId::new("c")),
        Some(SubsystemState::Started)
    );
    assert!(backend
        .subsystems()
        .init_order()
        .contains(&UPDATE_SUBSYSTEM_ID));
    assert!(backend.clock().is_running());

    assert!(backend.shutdown().is_empty());
    assert_eq!(lines(&log, "stop:"), vec!["c", "b", "a"]);
    assert!(!backend.clock().is_running());
}

#[tokio::test]
async fn test_dependencies_are_visible_during_create() {
    let log = Journal::default();
    let mut backend = boot(&log);

    let player = backend.spawn("Player", EntityContext::for_owner(1)).unwrap();
    let modifiers = player.component::<Modifiers>().unwrap();
    assert!(modifiers.saw_stats);
    assert_eq!(player.component_names()[0], "Stats");

    backend.shutdown();
}

#[test]
fn test_unsatisfied_archetype_fails_boot() {
    let runtime = runtime();
    let _guard = runtime.enter();

    let result = SimBackend::builder()
        .component::<States>()
        .component::<Modifiers>()
        .archetype("Broken", ["States", "Modifiers"])
        .boot(runtime.handle().clone());

    assert!(matches!(
        result,
        Err(BootError::Component(ComponentError::UnsatisfiedDependency {
            component: "Modifiers",
            missing: "Stats",
            ..
        }))
    ));
}

#[tokio::test]
async fn test_speed_boost_applies_once_and_reverts() {
    let log = Journal::default();
    let mut backend = boot(&log);
    let hooks = backend.hooks().clone();

    let player = backend.spawn("Player", EntityContext::new()).unwrap();
    let modifiers = player.component::<Modifiers>().unwrap();
    assert_eq!(modifiers.speed(), 10.0);

    hooks.register(&player, "SpeedBoost").unwrap();
    hooks.register(&player, "SpeedBoost").unwrap();
    assert_eq!(modifiers.speed(), 15.0);

    hooks.unregister(&player, "SpeedBoost").unwrap();
    assert_eq!(modifiers.speed(), 10.0);
    hooks.unregister(&player, "SpeedBoost").unwrap();
    assert_eq!(modifiers.speed(), 10.0);

    hooks.register(&player, "SpeedBoost").unwrap();
    assert_eq!(modifiers.speed(), 15.0);
    player.destroy();
    assert_eq!(modifiers.speed(), 10.0);
    assert!(hooks.active_hooks(player.id()).is_empty());

    backend.shutdown();
}

#[tokio::test]
async fn test_shutdown_destroys_remaining_entities_in_reverse_order() {
    let log = Journal::default();
    let mut backend = boot(&log);

    let events = Journal::default();
    let player = backend
        .spawn("Player", EntityContext::new().with(events.clone()))
        .unwrap();
    assert_eq!(backend.components().live_count(), 1);

    backend.shutdown();

    assert!(player.is_destroyed());
    assert!(player.get_component("Stats").is_none());
    assert_eq!(backend.components().live_count(), 0);
    assert_eq!(
        *events.lock(),
        vec!["destroy:Modifiers".to_string(), "destroy:States".to_string()]
    );

    // Destroying again runs nothing
    player.destroy();
    assert_eq!(events.lock().len(), 2);
}

#[tokio::test]
async fn test_config_archetypes_are_merged() {
    let mut config = SimConfig::default();
    config
        .archetypes
        .insert("Npc".to_string(), vec!["Stats".to_string()]);

    let mut backend = SimBackend::builder()
        .config(config)
        .component::<Stats>()
        .boot(tokio::runtime::Handle::current())
        .unwrap();

    let npc = backend.spawn("Npc", EntityContext::new()).unwrap();
    assert!(npc.has_component("Stats"));
    assert!(matches!(
        backend.spawn("Player", EntityContext::new()),
        Err(ComponentError::UnknownArchetype(_))
    ));

    backend.shutdown();
}

#[tokio::test]
async fn test_unusable_tick_rate_fails_boot() {
    let config = SimConfig::from_toml("tick_rate = 1e12").unwrap();

    let result = SimBackend::builder()
        .config(config)
        .boot(tokio::runtime::Handle::current());

    match result {
        Err(BootError::Subsystem(SubsystemError::Init { subsystem, source })) => {
            assert_eq!(subsystem, "update");
            assert!(matches!(*source, SubsystemError::InitFailed(_)));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("boot accepted a tick rate no timer can run"),
    }
}

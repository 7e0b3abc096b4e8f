//! Demo components: stats, states, speed modifiers and movement.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sim_backend::{Component, ComponentError, ComponentKind, Entity, EntityContext};

use super::services::Profile;

const BASE_SPEED: f32 = 8.0;
const SPEED_PER_LEVEL: f32 = 0.5;

/// Static numbers derived from the owner's profile
#[derive(Debug)]
pub struct Stats {
    pub name: String,
    pub level: u32,
    pub base_speed: f32,
}

impl Component for Stats {}

impl ComponentKind for Stats {
    const NAME: &'static str = "Stats";

    fn create(_entity: &Entity, context: &EntityContext) -> Result<Self, ComponentError> {
        let (name, level) = match context.get::<Profile>() {
            Some(profile) => (profile.name.clone(), profile.level),
            None => ("npc".to_string(), 1),
        };

        Ok(Self {
            name,
            level,
            base_speed: BASE_SPEED + SPEED_PER_LEVEL * level.saturating_sub(1) as f32,
        })
    }
}

/// Named status flags, e.g. `Stunned`
#[derive(Debug, Default)]
pub struct States {
    flags: Mutex<HashSet<&'static str>>,
}

impl States {
    pub fn set(&self, flag: &'static str) {
        self.flags.lock().insert(flag);
    }

    pub fn clear(&self, flag: &str) {
        self.flags.lock().remove(flag);
    }

    pub fn has(&self, flag: &str) -> bool {
        self.flags.lock().contains(flag)
    }
}

impl Component for States {
    fn destroy(&self) {
        self.flags.lock().clear();
    }
}

impl ComponentKind for States {
    const NAME: &'static str = "States";

    fn create(_entity: &Entity, _context: &EntityContext) -> Result<Self, ComponentError> {
        Ok(Self::default())
    }
}

/// Multiplicative speed modifiers keyed by their source
#[derive(Debug)]
pub struct Modifiers {
    stats: Arc<Stats>,
    speed: Mutex<Vec<(&'static str, f32)>>,
}

impl Modifiers {
    /// Add a multiplier from `source`, replacing any previous one from the same source
    pub fn push_speed(&self, source: &'static str, multiplier: f32) {
        let mut speed = self.speed.lock();
        speed.retain(|(s, _)| *s != source);
        speed.push((source, multiplier));
    }

    pub fn remove_speed(&self, source: &str) -> bool {
        let mut speed = self.speed.lock();
        let before = speed.len();
        speed.retain(|(s, _)| *s != source);
        speed.len() != before
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed.lock().iter().map(|(_, m)| m).product()
    }

    pub fn speed(&self) -> f32 {
        self.stats.base_speed * self.speed_multiplier()
    }
}

impl Component for Modifiers {
    fn destroy(&self) {
        self.speed.lock().clear();
    }
}

impl ComponentKind for Modifiers {
    const NAME: &'static str = "Modifiers";
    const DEPENDENCIES: &'static [&'static str] = &["Stats"];

    fn create(entity: &Entity, _context: &EntityContext) -> Result<Self, ComponentError> {
        Ok(Self {
            stats: entity.require::<Stats>()?,
            speed: Mutex::new(Vec::new()),
        })
    }
}

/// Walks the entity along its heading at the modified speed
#[derive(Debug)]
pub struct Movement {
    modifiers: Arc<Modifiers>,
    states: Option<Arc<States>>,
    position: Mutex<[f32; 2]>,
    heading: [f32; 2],
}

impl Movement {
    pub fn position(&self) -> [f32; 2] {
        *self.position.lock()
    }
}

impl Component for Movement {
    fn update(&self, delta_time: f32) {
        if self.states.as_ref().is_some_and(|states| states.has("Stunned")) {
            return;
        }

        let step = self.modifiers.speed() * delta_time;
        let mut position = self.position.lock();
        position[0] += self.heading[0] * step;
        position[1] += self.heading[1] * step;
    }
}

impl ComponentKind for Movement {
    const NAME: &'static str = "Movement";
    const DEPENDENCIES: &'static [&'static str] = &["Stats", "Modifiers"];

    fn create(entity: &Entity, context: &EntityContext) -> Result<Self, ComponentError> {
        // Spread players out by owner so they do not overlap
        let lane = context.owner.unwrap_or(0) as f32;

        Ok(Self {
            modifiers: entity.require::<Modifiers>()?,
            states: entity.component::<States>(),
            position: Mutex::new([0.0, lane]),
            heading: [1.0, 0.0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use sim_backend::{SimBackend, SimConfig};

    fn boot() -> SimBackend {
        demo::builder(SimConfig::default())
            .boot(tokio::runtime::Handle::current())
            .unwrap()
    }

    #[tokio::test]
    async fn test_profile_drives_stats() {
        let mut backend = boot();
        let context = EntityContext::for_owner(3).with(Profile {
            user_id: 3,
            name: "ada".to_string(),
            level: 5,
        });

        let player = backend.spawn(demo::PLAYER_ARCHETYPE, context).unwrap();
        let stats = player.component::<Stats>().unwrap();
        assert_eq!(stats.name, "ada");
        assert_eq!(stats.base_speed, 10.0);

        let npc = backend.spawn(demo::NPC_ARCHETYPE, EntityContext::new()).unwrap();
        assert_eq!(npc.component::<Stats>().unwrap().level, 1);
        assert!(npc.component::<Movement>().is_none());

        backend.shutdown();
    }

    #[tokio::test]
    async fn test_movement_uses_modifiers() {
        let mut backend = boot();
        let player = backend
            .spawn(demo::PLAYER_ARCHETYPE, EntityContext::for_owner(2))
            .unwrap();
        let modifiers = player.component::<Modifiers>().unwrap();
        let movement = player.component::<Movement>().unwrap();
        assert_eq!(movement.position(), [0.0, 2.0]);

        modifiers.push_speed("Mud", 0.5);
        modifiers.push_speed("Mud", 0.25);
        assert_eq!(modifiers.speed(), 2.0);

        movement.update(1.0);
        assert_eq!(movement.position(), [2.0, 2.0]);

        player.component::<States>().unwrap().set("Stunned");
        movement.update(1.0);
        assert_eq!(movement.position(), [2.0, 2.0]);

        assert!(modifiers.remove_speed("Mud"));
        assert!(!modifiers.remove_speed("Mud"));
        assert_eq!(modifiers.speed(), BASE_SPEED);

        backend.shutdown();
    }
}

use std::sync::Arc;

use sim_backend::{Entity, Hook, Reversal};

use super::components::Modifiers;

pub const SPEED_BOOST: &str = "SpeedBoost";
const SPEED_BOOST_MULTIPLIER: f32 = 1.5;

/// Temporary 1.5x speed multiplier
pub struct SpeedBoost;

impl Hook for SpeedBoost {
    fn name(&self) -> &'static str {
        SPEED_BOOST
    }

    fn on_activate(&self, entity: &Arc<Entity>) -> Reversal {
        let Some(modifiers) = entity.component::<Modifiers>() else {
            tracing::debug!("{} skipped: entity {} has no Modifiers", SPEED_BOOST, entity.id());
            return Reversal::NoEffect;
        };

        modifiers.push_speed(SPEED_BOOST, SPEED_BOOST_MULTIPLIER);

        let modifiers = Arc::downgrade(&modifiers);
        Reversal::undo(move || {
            if let Some(modifiers) = modifiers.upgrade() {
                modifiers.remove_speed(SPEED_BOOST);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use sim_backend::{EntityContext, SimConfig};

    #[tokio::test]
    async fn test_speed_boost_lifecycle() {
        let mut backend = demo::builder(SimConfig::default())
            .boot(tokio::runtime::Handle::current())
            .unwrap();
        let hooks = backend.hooks().clone();

        let player = backend
            .spawn(demo::PLAYER_ARCHETYPE, EntityContext::for_owner(1))
            .unwrap();
        let modifiers = player.component::<Modifiers>().unwrap();
        let base = modifiers.speed();

        hooks.register(&player, SPEED_BOOST).unwrap();
        hooks.register(&player, SPEED_BOOST).unwrap();
        assert_eq!(modifiers.speed(), base * 1.5);

        hooks.unregister(&player, SPEED_BOOST).unwrap();
        hooks.unregister(&player, SPEED_BOOST).unwrap();
        assert_eq!(modifiers.speed(), base);

        hooks.register(&player, SPEED_BOOST).unwrap();
        player.destroy();
        assert!(hooks.active_hooks(player.id()).is_empty());
        assert_eq!(modifiers.speed_multiplier(), 1.0);

        backend.shutdown();
    }

    #[tokio::test]
    async fn test_declines_without_modifiers() {
        let mut backend = demo::builder(SimConfig::default())
            .boot(tokio::runtime::Handle::current())
            .unwrap();

        let npc = backend
            .spawn(demo::NPC_ARCHETYPE, EntityContext::new())
            .unwrap();
        backend.hooks().register(&npc, SPEED_BOOST).unwrap();
        assert!(backend.hooks().is_active(npc.id(), SPEED_BOOST));

        backend.hooks().unregister(&npc, SPEED_BOOST).unwrap();
        backend.shutdown();
    }
}

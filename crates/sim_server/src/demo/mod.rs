//! Demo roster exercising the backend end to end: profile and player services,
//! a four-component player archetype and the `SpeedBoost` hook.

pub mod components;
pub mod hooks;
pub mod services;

use sim_backend::{ComponentKind, SimBackend, SimBackendBuilder, SimConfig};

use components::{Modifiers, Movement, States, Stats};
use hooks::SpeedBoost;
use services::{DataService, PlayerService};

pub const PLAYER_ARCHETYPE: &str = "Player";
pub const NPC_ARCHETYPE: &str = "Npc";

/// Builder with every demo component, hook and service registered.
///
/// `Player` and `Npc` archetypes are provided unless the config declares its own.
pub fn builder(config: SimConfig) -> SimBackendBuilder {
    let mut builder = SimBackend::builder()
        .component::<Stats>()
        .component::<States>()
        .component::<Modifiers>()
        .component::<Movement>()
        .hook(SpeedBoost)
        .subsystem(DataService::new())
        .subsystem(PlayerService::new());

    if !config.archetypes.contains_key(PLAYER_ARCHETYPE) {
        builder = builder.archetype(
            PLAYER_ARCHETYPE,
            [Stats::NAME, States::NAME, Modifiers::NAME, Movement::NAME],
        );
    }
    if !config.archetypes.contains_key(NPC_ARCHETYPE) {
        builder = builder.archetype(NPC_ARCHETYPE, [Stats::NAME, States::NAME]);
    }

    builder.config(config)
}

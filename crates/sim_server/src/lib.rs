//! # Sim Server
//!
//! Headless host for `sim_backend`: argument parsing, logging and runtime
//! setup, plus a demo roster of services, components and hooks.

pub mod args;
pub mod demo;
pub mod logging;
pub mod runtime;

use std::time::Duration;

use anyhow::{bail, Context};
use sim_backend::{EntityContext, SimConfig};
use tokio::runtime::Handle;

use demo::components::Movement;
use demo::hooks::SPEED_BOOST;
use demo::services::PlayerGateway;

const DEMO_PLAYERS: [(u64, &str); 3] = [(1, "ada"), (2, "grace"), (3, "linus")];

/// Boot the demo simulation, run it for `ticks` update ticks (or until Ctrl-C)
/// and shut it down.
pub async fn run(config: SimConfig, ticks: Option<u64>) -> anyhow::Result<()> {
    let mut backend = demo::builder(config)
        .boot(Handle::current())
        .context("Failed to boot simulation")?;

    let gateway = backend
        .handles()
        .resolve::<PlayerGateway>()
        .context("Player service did not publish its gateway")?;

    for (user_id, name) in DEMO_PLAYERS {
        gateway.join(user_id, name).await?;
    }
    if let Some(player) = gateway.player(DEMO_PLAYERS[0].0) {
        backend.hooks().register(&player, SPEED_BOOST)?;
    }
    let npc = backend.spawn(demo::NPC_ARCHETYPE, EntityContext::new())?;
    tracing::debug!("Spawned npc {}", npc.id());

    let clock = backend.clock().clone();
    match ticks {
        Some(ticks) => {
            let target = clock.tick_count() + ticks;
            while clock.tick_count() < target {
                if !clock.is_running() {
                    backend.shutdown();
                    bail!(
                        "Update loop stopped after {} of {} ticks",
                        clock.tick_count(),
                        target
                    );
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        None => {
            tracing::info!("Simulation running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    for (user_id, player) in gateway.players() {
        if let Some(movement) = player.component::<Movement>() {
            tracing::info!(
                "Player {} at {:?} (hooks: {:?})",
                user_id,
                movement.position(),
                backend.hooks().active_hooks(player.id())
            );
        }
    }
    tracing::info!("Ran {} ticks ({:.1} TPS)", clock.tick_count(), clock.tps());

    gateway.leave(DEMO_PLAYERS[1].0).await?;

    let failures = backend.shutdown();
    for failure in &failures {
        tracing::error!("{}", failure);
    }
    if !failures.is_empty() {
        bail!("{} subsystem(s) failed to stop", failures.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_for_fixed_ticks() {
        let config = SimConfig {
            tick_rate: 200.0,
            ..SimConfig::default()
        };
        tokio::time::timeout(Duration::from_secs(5), run(config, Some(5)))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unusable_tick_rate_fails_boot() {
        let config = SimConfig::from_toml("tick_rate = 1e12").unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), run(config, Some(5)))
            .await
            .unwrap();

        let error = result.unwrap_err();
        assert!(format!("{error:#}").contains("Invalid tick rate"));
    }
}

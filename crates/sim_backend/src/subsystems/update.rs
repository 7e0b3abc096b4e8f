//! # Update Subsystem
//!
//! Drives every live entity's component `update` at a fixed tick rate. The
//! loop runs as this subsystem's start routine on the shared runtime and exits
//! once the subsystem is stopped.
//!
//! The measured rate and tick count are published as an [`UpdateClock`] handle,
//! so other subsystems (and the host) can observe or pause the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

use super::framework::{StartFuture, Subsystem, SubsystemContext, SubsystemError, SubsystemId};
use crate::components::ComponentLoader;

/// Subsystem ID for the update loop
pub const UPDATE_SUBSYSTEM_ID: SubsystemId = SubsystemId::new("update");

/// Highest accepted tick rate
pub const MAX_TICK_RATE: f32 = 1000.0;

/// Interval between ticks, `None` if `target_tps` cannot drive a timer
fn tick_period(target_tps: f32) -> Option<Duration> {
    if !target_tps.is_finite() || target_tps <= 0.0 || target_tps > MAX_TICK_RATE {
        return None;
    }
    Duration::try_from_secs_f32(1.0 / target_tps)
        .ok()
        .filter(|period| !period.is_zero())
}

/// Shared view of the update loop
#[derive(Debug)]
pub struct UpdateClock {
    target_tps: f32,
    running: AtomicBool,
    paused: AtomicBool,
    ticks: AtomicU64,
    tps: Mutex<f32>,
}

impl UpdateClock {
    fn new(target_tps: f32) -> Self {
        Self {
            target_tps,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            tps: Mutex::new(0.0),
        }
    }

    pub fn target_tps(&self) -> f32 {
        self.target_tps
    }

    /// Ticks measured over the last full second
    pub fn tps(&self) -> f32 {
        *self.tps.lock()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Paused loops keep their schedule but skip entity updates
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

/// Fixed-rate entity update loop
pub struct UpdateSystem {
    clock: Arc<UpdateClock>,
    period: Option<Duration>,
    components: Option<Arc<ComponentLoader>>,
}

/// Marks the loop stopped however its task ends, including abort or panic
struct RunningGuard(Arc<UpdateClock>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

impl UpdateSystem {
    pub fn new(target_tps: f32) -> Self {
        Self {
            clock: Arc::new(UpdateClock::new(target_tps)),
            period: None,
            components: None,
        }
    }

    pub fn clock(&self) -> Arc<UpdateClock> {
        self.clock.clone()
    }

    /// Run a single update over every live entity. Returns how many were updated.
    pub fn tick(&self, delta_time: f32) -> usize {
        match &self.components {
            Some(components) => tick_entities(components, delta_time),
            None => 0,
        }
    }
}

fn tick_entities(components: &ComponentLoader, delta_time: f32) -> usize {
    let entities = components.entities();
    for entity in &entities {
        entity.update(delta_time);
    }
    entities.len()
}

impl Subsystem for UpdateSystem {
    fn id(&self) -> SubsystemId {
        UPDATE_SUBSYSTEM_ID
    }

    fn dependencies(&self) -> Vec<SubsystemId> {
        vec![]
    }

    fn init(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
        let target_tps = self.clock.target_tps;
        let Some(period) = tick_period(target_tps) else {
            return Err(SubsystemError::InitFailed(format!(
                "Invalid tick rate: {} (expected 0 < rate <= {})",
                target_tps, MAX_TICK_RATE
            )));
        };

        self.period = Some(period);
        self.components = Some(context.components.clone());
        context.handles.publish(self.clock.clone());

        tracing::debug!("Update loop ready at {} TPS", target_tps);
        Ok(())
    }

    fn start(&mut self, _context: &SubsystemContext) -> Option<StartFuture> {
        let period = self.period?;
        let components = self.components.clone()?;
        let clock = self.clock.clone();
        clock.running.store(true, Ordering::Release);
        let running = RunningGuard(clock.clone());

        Some(Box::pin(async move {
            let _running = running;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last_tick = Instant::now();
            let mut tps_timer = Instant::now();
            let mut window_ticks = 0u32;

            tracing::info!("Update loop running at target {} TPS", clock.target_tps);

            loop {
                interval.tick().await;
                if !clock.is_running() {
                    break;
                }

                let now = Instant::now();
                let delta = (now - last_tick).as_secs_f32();
                last_tick = now;

                if !clock.is_paused() {
                    tick_entities(&components, delta);
                }

                clock.ticks.fetch_add(1, Ordering::Relaxed);
                window_ticks += 1;

                if tps_timer.elapsed() >= Duration::from_secs(1) {
                    *clock.tps.lock() = window_ticks as f32 / tps_timer.elapsed().as_secs_f32();
                    window_ticks = 0;
                    tps_timer = Instant::now();
                }
            }

            tracing::debug!("Update loop stopped after {} ticks", clock.tick_count());
            Ok(())
        }))
    }

    fn stop(&mut self) -> Result<(), SubsystemError> {
        self.clock.running.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        Component, ComponentError, ComponentKind, ComponentSource, Composition, Entity,
        EntityContext,
    };
    use crate::hooks::HookEngine;
    use crate::subsystems::framework::SubsystemRegistry;

    struct Ticker {
        elapsed: Mutex<f32>,
        calls: AtomicU64,
    }

    impl Component for Ticker {
        fn update(&self, delta_time: f32) {
            *self.elapsed.lock() += delta_time;
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    impl ComponentKind for Ticker {
        const NAME: &'static str = "Ticker";

        fn create(_entity: &Entity, _context: &EntityContext) -> Result<Self, ComponentError> {
            Ok(Self {
                elapsed: Mutex::new(0.0),
                calls: AtomicU64::new(0),
            })
        }
    }

    fn context(handle: tokio::runtime::Handle) -> SubsystemContext {
        let hooks = Arc::new(HookEngine::new());
        let components = Arc::new(ComponentLoader::new(hooks.clone()));
        components
            .configure(
                Composition::new(ComponentSource::new().with::<Ticker>())
                    .archetype("Clock", ["Ticker"]),
            )
            .unwrap();
        SubsystemContext::with_composition(handle, components, hooks)
    }

    #[test]
    fn test_manual_tick_updates_live_entities() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let context = context(runtime.handle().clone());
        let mut system = UpdateSystem::new(60.0);
        assert_eq!(system.tick(0.1), 0);

        system.init(&context).unwrap();
        let first = context.components.create_entity("Clock", EntityContext::new()).unwrap();
        let second = context.components.create_entity("Clock", EntityContext::new()).unwrap();
        second.destroy();

        assert_eq!(system.tick(0.5), 1);
        assert_eq!(system.tick(0.25), 1);

        let ticker = first.component::<Ticker>().unwrap();
        assert_eq!(ticker.calls.load(Ordering::Relaxed), 2);
        assert!((*ticker.elapsed.lock() - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rejects_invalid_tick_rate() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let context = context(runtime.handle().clone());

        for rate in [0.0, -30.0, f32::NAN, f32::INFINITY, f32::MIN_POSITIVE, 1e12] {
            let mut system = UpdateSystem::new(rate);
            assert!(
                matches!(system.init(&context), Err(SubsystemError::InitFailed(_))),
                "tick rate {rate} was accepted"
            );
            assert!(system.start(&context).is_none());
        }

        let mut system = UpdateSystem::new(MAX_TICK_RATE);
        assert!(system.init(&context).is_ok());
    }

    #[tokio::test]
    async fn test_aborted_loop_is_not_running() {
        let context = context(tokio::runtime::Handle::current());
        let mut system = UpdateSystem::new(100.0);
        system.init(&context).unwrap();

        let task = tokio::spawn(system.start(&context).unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(system.clock().is_running());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!system.clock().is_running());
    }

    #[tokio::test]
    async fn test_loop_ticks_until_stopped() {
        let context = context(tokio::runtime::Handle::current());
        let entity = context.components.create_entity("Clock", EntityContext::new()).unwrap();

        let mut registry = SubsystemRegistry::new();
        registry.register(UpdateSystem::new(200.0)).unwrap();
        registry.init_all(&context).unwrap();
        registry.start_all(&context).unwrap();

        let clock = context.handles.resolve::<UpdateClock>().unwrap();
        assert!(clock.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let ticker = entity.component::<Ticker>().unwrap();
        assert!(ticker.calls.load(Ordering::Relaxed) > 0);
        assert!(clock.tick_count() > 0);

        assert!(registry.stop_all().is_empty());
        assert!(!clock.is_running());

        let after_stop = clock.tick_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clock.tick_count(), after_stop);
    }

    #[tokio::test]
    async fn test_paused_loop_skips_entities() {
        let context = context(tokio::runtime::Handle::current());
        let entity = context.components.create_entity("Clock", EntityContext::new()).unwrap();

        let mut system = UpdateSystem::new(200.0);
        system.init(&context).unwrap();
        system.clock().set_paused(true);

        let routine = system.start(&context).unwrap();
        let task = tokio::spawn(routine);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(system.clock().tick_count() > 0);
        assert_eq!(
            entity.component::<Ticker>().unwrap().calls.load(Ordering::Relaxed),
            0
        );

        system.stop().unwrap();
        task.await.unwrap().unwrap();
    }
}

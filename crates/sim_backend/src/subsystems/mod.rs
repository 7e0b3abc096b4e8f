//! Process-lifetime subsystems.
//!
//! Services and controllers implement [`framework::Subsystem`] and are driven
//! by the [`framework::SubsystemRegistry`]. The periodic entity update loop is
//! itself a subsystem, see [`update`].

pub mod framework;
pub mod update;

pub use framework::{
    HandleRegistry, StartFuture, Subsystem, SubsystemContext, SubsystemError, SubsystemId,
    SubsystemRegistry, SubsystemState,
};
pub use update::{UpdateClock, UpdateSystem, MAX_TICK_RATE, UPDATE_SUBSYSTEM_ID};

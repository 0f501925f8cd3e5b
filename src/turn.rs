//! Turn orchestration
//!
//! One user-submitted turn is a small state machine in the Elm style: a pure
//! [`transition`] function decides the next state and the effects to run,
//! and [`TurnRunner`] executes those effects against the moderation gate,
//! the model backend and the tools.

mod effect;
mod event;
mod runner;
mod state;
mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use effect::TurnEffect;
pub use event::TurnEvent;
pub use runner::TurnRunner;
pub use state::{TurnContext, TurnOutcome, TurnState};
pub use transition::{transition, TransitionError};

//! Incremental message-part streaming
//!
//! The producer turns an in-progress generation into an ordered sequence of
//! [`StreamEvent`]s over one channel; the receiver folds that sequence back
//! into a [`Message`](crate::message::Message).

mod assembler;
mod emitter;
mod event;
mod writer;

#[cfg(test)]
mod consume;
#[cfg(test)]
mod proptests;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use emitter::StepEmitter;
pub use event::{FinishReason, StreamEvent};
pub use writer::{turn_channel, StreamClosed, StreamWriter};

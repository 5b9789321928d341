//! Mutation log and fork revert
//!
//! Handlers write through [`Mutator`], which records one inverse per mutation
//! into the block's undo stack. [`ForkReverter`] consumes the stacks newest
//! first when the block feed reports a fork.

pub mod log;
pub mod mutator;
pub mod revert;

pub use log::UndoLog;
pub use mutator::{restore_fields, Mutator};
pub use revert::{ForkReverter, RevertSummary};

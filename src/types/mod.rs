//! Shared types for Prism

pub mod block;
pub mod error;

pub use block::{Action, Block, BlockContext, ChainEvent, FeedEvent, ForkNotice, Transaction};
pub use error::{PrismError, Result};

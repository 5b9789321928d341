//! Prism - read-model projection for a social-content blockchain
//!
//! Prism consumes an ordered feed of chain blocks, disperses
//! every contract action into MongoDB documents and serves them through a
//! JSON-RPC query API.
//!
//! ## Components
//!
//! - **Ingest**: block feed subscriber, action router and dispatcher loop
//! - **Handlers**: per-domain projections of contract actions
//! - **Undo**: recorded inverses per block and fork revert
//! - **Reward**: payout splitting and hot/trending scores
//! - **Feed cache**: generation-tagged ranked feeds
//! - **API / Server**: query methods and their HTTP front
//! - **Backfill**: offline recounts run by `prism-backfill`

pub mod api;
pub mod backfill;
pub mod config;
pub mod db;
pub mod feed_cache;
pub mod handlers;
pub mod ingest;
pub mod nats;
pub mod ordering;
pub mod reward;
pub mod server;
pub mod types;
pub mod undo;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{PrismError, Result};

//! Query server: JSON-RPC over hyper

pub mod health;
pub mod http;
pub mod rpc;

pub use http::{run, AppState};

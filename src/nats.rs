//! NATS client wrapper
//!
//! Connects with a short initial timeout so a missing broker fails startup
//! fast; reconnection after a successful connect is handled by the client.

use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use tracing::info;

use crate::config::NatsArgs;
use crate::types::{PrismError, Result};

/// Keep-alive ping interval
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| PrismError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);
        Ok(Self { client })
    }

    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber> {
        Ok(self.client.subscribe(subject.to_string()).await?)
    }
}

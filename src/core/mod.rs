// src/core/mod.rs
pub mod agent;
pub mod controller;
pub mod protect;
pub mod wait;

use crate::config::AgentConfig;
use crate::connectors::traits::{BrokerGateway, PriceOracle};
use crate::notify::NotificationSink;
use std::sync::Arc;

use self::protect::ProtectiveOrderCoordinator;

/// External collaborators shared by the controller and every agent loop.
#[derive(Clone)]
pub struct Services {
    pub oracle: Arc<dyn PriceOracle>,
    pub broker: Arc<dyn BrokerGateway>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Services {
    pub fn coordinator(&self, config: &AgentConfig) -> ProtectiveOrderCoordinator {
        ProtectiveOrderCoordinator::new(
            self.broker.clone(),
            self.notifier.clone(),
            config.price_tick,
            config.call_timeout(),
        )
    }
}

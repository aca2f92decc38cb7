use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A live network location for a capability, as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub capability: String,
    pub service_id: String,
    pub address: String,
    pub port: u16,
    pub alive: bool,
    pub refreshed_at: DateTime<Utc>,
}

impl ServiceEndpoint {
    pub fn new(
        capability: impl Into<String>,
        service_id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            capability: capability.into(),
            service_id: service_id.into(),
            address: address.into(),
            port,
            alive: true,
            refreshed_at: Utc::now(),
        }
    }

    /// `address:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}:{}", self.capability, self.service_id, self.address, self.port)
    }
}

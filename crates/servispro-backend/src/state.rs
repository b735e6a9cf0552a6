use std::sync::Mutex;

use servispro_gateway_mock::{GatewayConfig, GatewayError, GatewayLimits, MockGateway};
use tracing::error;

/// One gateway shared by every request handler.
#[derive(Debug, Default)]
pub struct BackendState {
    gateway: Mutex<MockGateway>,
}

impl BackendState {
    pub fn new(config: GatewayConfig, limits: GatewayLimits) -> Self {
        Self::from_gateway(MockGateway::new(config, limits))
    }

    pub fn from_gateway(gateway: MockGateway) -> Self {
        Self {
            gateway: Mutex::new(gateway),
        }
    }

    /// Runs `f` under the gateway lock. A poisoned lock reads as an outage.
    pub fn with_gateway<R>(
        &self,
        f: impl FnOnce(&mut MockGateway) -> Result<R, GatewayError>,
    ) -> Result<R, GatewayError> {
        let mut gateway = self.gateway.lock().map_err(|_| {
            error!("gateway lock poisoned");
            GatewayError::Unavailable
        })?;
        f(&mut gateway)
    }
}

/// Gateway clock: wall time in unix milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

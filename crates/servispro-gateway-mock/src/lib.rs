//! In-memory mobile-money operator used by tests, the demo and the backend.

pub mod mock_gateway;
pub mod scenarios;

pub use mock_gateway::{
    GatewayConfig, GatewayError, GatewayErrorKind, GatewayFaults, GatewayLimits, MockGateway,
    SmsMessage,
};
pub use scenarios::{DemoScenario, DEMO_INVESTIGATION_FEE, DEMO_PHONE};

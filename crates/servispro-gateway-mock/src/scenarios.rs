use servispro_types::{
    AuthSession, CustomerId, CustomerProfile, Gnf, InitiatePaymentRequest, JobId, PaymentMethod,
    ProviderId, ProviderProfile,
};

use crate::mock_gateway::MockGateway;

pub const DEMO_INVESTIGATION_FEE: Gnf = Gnf::new(50_000);
pub const DEMO_PHONE: &str = "620000000";

/// A plumber with a 50 000 GNF investigation fee, a signed-in customer and an
/// empty gateway.
#[derive(Debug, Clone)]
pub struct DemoScenario {
    pub provider: ProviderProfile,
    pub customer: AuthSession,
    pub method: PaymentMethod,
    pub gateway: MockGateway,
}

impl DemoScenario {
    pub fn new() -> Self {
        Self::with_gateway(MockGateway::default())
    }

    pub fn with_gateway(gateway: MockGateway) -> Self {
        let provider = ProviderProfile {
            id: ProviderId::new("prov-mamadou-diallo").expect("static provider id is valid"),
            first_name: "Mamadou".to_string(),
            last_name: "Diallo".to_string(),
            profession: "Plombier".to_string(),
            investigation_fee: Some(DEMO_INVESTIGATION_FEE),
        };
        let customer = AuthSession::Customer {
            profile: CustomerProfile {
                id: CustomerId::new("cust-fatoumata-camara").expect("static customer id is valid"),
                first_name: "Fatoumata".to_string(),
                last_name: "Camara".to_string(),
                phone_number: Some(DEMO_PHONE.to_string()),
            },
            token: "demo-customer-token".to_string(),
        };
        Self {
            provider,
            customer,
            method: PaymentMethod::OrangeMoney,
            gateway,
        }
    }

    pub fn initiate_request(&self, now_millis: u64) -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            job_id: JobId::provisional(now_millis),
            provider_id: self.provider.id.clone(),
            customer_phone: self
                .customer
                .payer_phone()
                .unwrap_or(DEMO_PHONE)
                .to_string(),
            customer_name: self.customer.payer_name(),
            amount: self.provider.investigation_fee(),
            payment_method: self.method,
        }
    }
}

impl Default for DemoScenario {
    fn default() -> Self {
        Self::new()
    }
}

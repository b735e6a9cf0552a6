//! One-time-code channels used by the payment wizard.
//!
//! [`RemoteOtpChannel`] lets the backend generate, text and check the code;
//! the client only ever sees a delivery acknowledgement. [`DemoOtpChannel`]
//! generates the code locally, discloses it in-app and accepts a fixed bypass
//! value. It exists for demos and must be chosen explicitly.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::thread_rng;
use servispro_types::{OtpCode, OtpDispatch, PaymentId, PhoneNumber};
use thiserror::Error;

use crate::transport::{PaymentTransport, TransportError};

/// Code accepted by [`DemoOtpChannel::new`] regardless of what was generated.
pub const DEMO_BYPASS_CODE: &str = "123456";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no code was issued for payment {0}")]
    NotIssued(PaymentId),
    #[error("otp channel state unavailable")]
    Poisoned,
}

impl OtpError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Transport(err) => err.detail(),
            _ => None,
        }
    }
}

/// How an issued code reached the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpDelivery {
    /// Shown in-app (demo only).
    Disclosed(OtpCode),
    /// Texted by the backend; the client never sees the code.
    Dispatched(OtpDispatch),
}

#[async_trait(?Send)]
pub trait OtpChannel {
    /// Issues a fresh code for `payment_id`, invalidating any previous one.
    async fn issue(
        &self,
        payment_id: &PaymentId,
        phone: &PhoneNumber,
    ) -> Result<OtpDelivery, OtpError>;

    /// `Ok(false)` is a mismatch; errors are reserved for channel failures.
    async fn verify(&self, payment_id: &PaymentId, code: &OtpCode) -> Result<bool, OtpError>;

    /// Forgets any local state kept for `payment_id`.
    fn discard(&self, _payment_id: &PaymentId) {}
}

#[derive(Debug, Default)]
pub struct DemoOtpChannel {
    bypass: Option<OtpCode>,
    codes: Mutex<HashMap<PaymentId, OtpCode>>,
}

impl DemoOtpChannel {
    pub fn new() -> Self {
        Self {
            bypass: OtpCode::parse(DEMO_BYPASS_CODE).ok(),
            codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn without_bypass() -> Self {
        Self::default()
    }

    pub fn current_code(&self, payment_id: &PaymentId) -> Option<OtpCode> {
        self.codes
            .lock()
            .ok()
            .and_then(|codes| codes.get(payment_id).cloned())
    }
}

#[async_trait(?Send)]
impl OtpChannel for DemoOtpChannel {
    async fn issue(
        &self,
        payment_id: &PaymentId,
        _phone: &PhoneNumber,
    ) -> Result<OtpDelivery, OtpError> {
        let mut codes = self.codes.lock().map_err(|_| OtpError::Poisoned)?;
        let code = OtpCode::random_excluding(&mut thread_rng(), codes.get(payment_id));
        codes.insert(payment_id.clone(), code.clone());
        Ok(OtpDelivery::Disclosed(code))
    }

    async fn verify(&self, payment_id: &PaymentId, code: &OtpCode) -> Result<bool, OtpError> {
        let codes = self.codes.lock().map_err(|_| OtpError::Poisoned)?;
        let issued = codes
            .get(payment_id)
            .ok_or_else(|| OtpError::NotIssued(payment_id.clone()))?;
        Ok(issued == code || self.bypass.as_ref() == Some(code))
    }

    fn discard(&self, payment_id: &PaymentId) {
        if let Ok(mut codes) = self.codes.lock() {
            codes.remove(payment_id);
        }
    }
}

#[derive(Clone)]
pub struct RemoteOtpChannel<T: PaymentTransport> {
    transport: T,
}

impl<T: PaymentTransport> RemoteOtpChannel<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait(?Send)]
impl<T: PaymentTransport> OtpChannel for RemoteOtpChannel<T> {
    async fn issue(
        &self,
        payment_id: &PaymentId,
        _phone: &PhoneNumber,
    ) -> Result<OtpDelivery, OtpError> {
        let dispatch = self.transport.request_otp(payment_id).await?;
        Ok(OtpDelivery::Dispatched(dispatch))
    }

    async fn verify(&self, payment_id: &PaymentId, code: &OtpCode) -> Result<bool, OtpError> {
        Ok(self.transport.verify_otp(payment_id, code).await?.verified)
    }
}

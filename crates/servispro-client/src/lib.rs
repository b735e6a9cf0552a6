//! ServisPro payment client.
//!
//! This crate exposes:
//! - transport abstractions (`PaymentTransport`, in-process `MockTransport`, REST `HttpTransport`),
//! - one-time-code channels (`OtpChannel`, `RemoteOtpChannel`, demo-only `DemoOtpChannel`),
//! - per-attempt state (`PaymentSession`),
//! - the payment wizard (`PaymentWizard`) that walks a customer from fee disclosure to receipt.

pub mod otp;
pub mod session;
pub mod transport;
pub mod wizard;

pub use otp::{DemoOtpChannel, OtpChannel, OtpDelivery, OtpError, RemoteOtpChannel, DEMO_BYPASS_CODE};
pub use session::{NoticeLevel, PaymentSession, Step, WizardNotice};
pub use transport::{
    CallCounts, HttpTransport, MockTransport, PaymentTransport, TransportConfig, TransportError,
};
pub use wizard::{
    CloseHandle, PaymentRequest, PaymentWizard, ResendOutcome, WizardCallbacks, WizardConfig,
    WizardError,
};

pub(crate) fn unix_millis_now() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

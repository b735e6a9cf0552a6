//! Domain types shared by the ServisPro payment client, gateway simulator and backend.

pub mod auth;
pub mod error;
pub mod ids;
pub mod payment;
pub mod wire;

pub use auth::{AuthSession, CustomerProfile, ProviderProfile, Role, ANONYMOUS_PAYER_NAME};
pub use error::ValidationError;
pub use ids::{CustomerId, JobId, PaymentId, ProviderId};
pub use payment::{
    Gnf, OtpCode, PaymentMethod, PhoneNumber, TransactionReceipt, TransactionRef,
    MIN_PHONE_DIGITS, OTP_LEN,
};
pub use wire::{
    ErrorBody, InitiatePaymentRequest, OtpDispatch, OtpVerdict, PaymentAck, PaymentStatus,
    PaymentView, RefundAck, RefundReason, RefundRequest, VerifyOtpRequest,
};

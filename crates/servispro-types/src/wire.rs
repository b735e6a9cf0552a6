//! JSON bodies exchanged with the payment backend under `/api/payments`.

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, PaymentId, ProviderId};
use crate::payment::{Gnf, PaymentMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub job_id: JobId,
    pub provider_id: ProviderId,
    pub customer_phone: String,
    pub customer_name: String,
    pub amount: Gnf,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAck {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub message: String,
}

/// Delivery acknowledgement for a server-generated code. Never carries the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpDispatch {
    pub payment_id: PaymentId,
    pub sent_to: String,
    pub expires_in_secs: u64,
    pub resend_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpVerdict {
    pub payment_id: PaymentId,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub job_id: JobId,
    pub provider_id: ProviderId,
    pub customer_phone: String,
    pub customer_name: String,
    pub amount: Gnf,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at_millis: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confirmed_at_millis: Option<u64>,
    pub otp_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// Provider never showed up: fee refunded in full.
    ProviderNoShow,
    /// Provider came: fee is not refundable.
    ProviderAttended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub reason: RefundReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundAck {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub refunded_amount: Gnf,
}

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

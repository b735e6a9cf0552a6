//! PaymentSession: everything the wizard knows about one payment attempt.

use std::fmt;

use chrono::{DateTime, Utc};
use servispro_types::{
    Gnf, OtpCode, OtpDispatch, PaymentId, PaymentMethod, PhoneNumber, TransactionReceipt,
    TransactionRef,
};
use tokio::time::Instant;

use crate::otp::OtpDelivery;

/// Wizard steps, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Info,
    OtpSending,
    OtpEntry,
    Processing,
    Success,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::OtpSending => "otp_sending",
            Self::OtpEntry => "otp_entry",
            Self::Processing => "processing",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Toast-style message for the embedding page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardNotice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub(crate) step: Step,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) phone_input: String,
    pub(crate) phone_number: Option<PhoneNumber>,
    pub(crate) amount: Gnf,
    pub(crate) generated_code: Option<OtpCode>,
    pub(crate) otp_dispatch: Option<OtpDispatch>,
    pub(crate) entered_code: String,
    pub(crate) payment_id: Option<PaymentId>,
    pub(crate) transaction_ref: Option<TransactionRef>,
    pub(crate) transaction_date: Option<DateTime<Utc>>,
    pub(crate) receipt: Option<TransactionReceipt>,
    pub(crate) error: Option<String>,
    pub(crate) reveal_at: Option<Instant>,
    pub(crate) processing_until: Option<Instant>,
    pub(crate) resend_ready_at: Option<Instant>,
}

impl PaymentSession {
    pub(crate) fn new(method: PaymentMethod, phone_input: String, amount: Gnf) -> Self {
        Self {
            step: Step::Info,
            payment_method: method,
            phone_input,
            phone_number: None,
            amount,
            generated_code: None,
            otp_dispatch: None,
            entered_code: String::new(),
            payment_id: None,
            transaction_ref: None,
            transaction_date: None,
            receipt: None,
            error: None,
            reveal_at: None,
            processing_until: None,
            resend_ready_at: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Phone as typed in the form.
    pub fn phone_input(&self) -> &str {
        &self.phone_input
    }

    /// Phone accepted at submission.
    pub fn phone_number(&self) -> Option<&PhoneNumber> {
        self.phone_number.as_ref()
    }

    pub fn amount(&self) -> Gnf {
        self.amount
    }

    /// Code shown in-app. Only set when the OTP channel discloses codes.
    pub fn generated_code(&self) -> Option<&OtpCode> {
        self.generated_code.as_ref()
    }

    pub fn otp_dispatch(&self) -> Option<&OtpDispatch> {
        self.otp_dispatch.as_ref()
    }

    pub fn entered_code(&self) -> &str {
        &self.entered_code
    }

    pub fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    pub fn transaction_ref(&self) -> Option<&TransactionRef> {
        self.transaction_ref.as_ref()
    }

    pub fn transaction_date(&self) -> Option<DateTime<Utc>> {
        self.transaction_date
    }

    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        self.receipt.as_ref()
    }

    /// Inline error for the current step.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whole seconds left before a resend is allowed; counts down by one each second.
    pub fn resend_cooldown_seconds(&self) -> u64 {
        self.resend_ready_at
            .map(|ready_at| {
                let remaining = ready_at.saturating_duration_since(Instant::now());
                remaining.as_millis().div_ceil(1000) as u64
            })
            .unwrap_or(0)
    }

    pub(crate) fn apply_delivery(&mut self, delivery: OtpDelivery) {
        match delivery {
            OtpDelivery::Disclosed(code) => {
                self.generated_code = Some(code);
                self.otp_dispatch = None;
            }
            OtpDelivery::Dispatched(dispatch) => {
                self.generated_code = None;
                self.otp_dispatch = Some(dispatch);
            }
        }
    }

    /// Drops everything tied to the failed attempt but keeps the form inputs.
    pub(crate) fn reset_to_info(&mut self) {
        self.step = Step::Info;
        self.payment_id = None;
        self.generated_code = None;
        self.otp_dispatch = None;
        self.entered_code.clear();
        self.reveal_at = None;
        self.processing_until = None;
        self.resend_ready_at = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooldown_counts_down_in_whole_seconds() {
        let mut session = PaymentSession::new(PaymentMethod::MtnMomo, String::new(), Gnf::new(1));
        assert_eq!(session.resend_cooldown_seconds(), 0);

        session.resend_ready_at = Some(Instant::now() + Duration::from_secs(60));
        assert_eq!(session.resend_cooldown_seconds(), 60);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(session.resend_cooldown_seconds(), 60);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(session.resend_cooldown_seconds(), 59);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(session.resend_cooldown_seconds(), 0);
    }

    #[test]
    fn reset_keeps_form_inputs() {
        let mut session =
            PaymentSession::new(PaymentMethod::OrangeMoney, "620000000".to_string(), Gnf::new(5));
        session.step = Step::Processing;
        session.payment_id = Some(PaymentId::new("p").unwrap());
        session.entered_code = "123456".to_string();
        session.reset_to_info();
        assert_eq!(session.step(), Step::Info);
        assert!(session.payment_id().is_none());
        assert!(session.entered_code().is_empty());
        assert_eq!(session.phone_input(), "620000000");
        assert_eq!(session.payment_method(), PaymentMethod::OrangeMoney);
    }

    #[test]
    fn steps_are_ordered() {
        assert!(Step::Info < Step::OtpSending);
        assert!(Step::OtpEntry < Step::Processing);
        assert_eq!(Step::OtpEntry.to_string(), "otp_entry");
    }
}

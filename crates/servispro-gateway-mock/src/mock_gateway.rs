//! MockGateway: payment records, server-side OTP challenges with an SMS outbox,
//! confirmation, refunds and bounded retention.

use std::collections::{BTreeSet, HashMap};

use rand::thread_rng;
use servispro_types::{
    Gnf, InitiatePaymentRequest, JobId, OtpCode, OtpDispatch, OtpVerdict, PaymentAck, PaymentId,
    PaymentMethod, PaymentStatus, PaymentView, PhoneNumber, ProviderId, RefundAck, RefundReason,
    ValidationError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub min_phone_digits: usize,
    pub otp_ttl_ms: u64,
    pub otp_resend_cooldown_ms: u64,
    pub max_otp_attempts: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_phone_digits: servispro_types::MIN_PHONE_DIGITS,
            otp_ttl_ms: 5 * 60 * 1000,
            otp_resend_cooldown_ms: 60 * 1000,
            max_otp_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayLimits {
    pub max_payments: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_payments: 10_000,
        }
    }
}

/// Switches that make the next calls fail as if the operator were down.
#[derive(Debug, Clone, Default)]
pub struct GatewayFaults {
    pub fail_initiate: bool,
    pub fail_confirm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    TooManyRequests,
    Unavailable,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Paiement introuvable: {0}")]
    UnknownPayment(PaymentId),
    #[error("Le paiement n'est plus en attente (statut {0:?})")]
    NotPending(PaymentStatus),
    #[error("Seul un paiement confirmé peut être remboursé (statut {0:?})")]
    NotRefundable(PaymentStatus),
    #[error("Non remboursable: le prestataire s'est présenté")]
    ProviderAttended,
    #[error("Aucun code n'a été envoyé pour ce paiement")]
    OtpNotIssued,
    #[error("Le code a expiré, veuillez en demander un nouveau")]
    OtpExpired,
    #[error("Trop de tentatives, veuillez demander un nouveau code")]
    OtpAttemptsExceeded,
    #[error("Veuillez patienter {retry_after_secs}s avant de renvoyer le code")]
    OtpThrottled { retry_after_secs: u64 },
    #[error("Le code de confirmation n'a pas été vérifié")]
    OtpNotVerified,
    #[error("Service de paiement indisponible")]
    Unavailable,
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::Validation(_) => GatewayErrorKind::BadRequest,
            Self::UnknownPayment(_) => GatewayErrorKind::NotFound,
            Self::NotPending(_)
            | Self::NotRefundable(_)
            | Self::ProviderAttended
            | Self::OtpNotIssued
            | Self::OtpExpired
            | Self::OtpAttemptsExceeded
            | Self::OtpNotVerified => GatewayErrorKind::Conflict,
            Self::OtpThrottled { .. } => GatewayErrorKind::TooManyRequests,
            Self::Unavailable => GatewayErrorKind::Unavailable,
        }
    }
}

impl GatewayErrorKind {
    /// HTTP status the backend answers with for this kind of failure.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::TooManyRequests => 429,
            Self::Unavailable => 503,
        }
    }
}

/// Text message "delivered" to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub payment_id: PaymentId,
    pub to: PhoneNumber,
    pub body: String,
    pub code: OtpCode,
    pub sent_at_millis: u64,
}

#[derive(Debug, Clone)]
struct OtpChallenge {
    code: OtpCode,
    issued_at_millis: u64,
    attempts: u32,
    verified: bool,
}

#[derive(Debug, Clone)]
struct PaymentRecord {
    payment_id: PaymentId,
    job_id: JobId,
    provider_id: ProviderId,
    customer_phone: PhoneNumber,
    customer_name: String,
    amount: Gnf,
    method: PaymentMethod,
    status: PaymentStatus,
    created_at_millis: u64,
    confirmed_at_millis: Option<u64>,
    otp: Option<OtpChallenge>,
}

impl PaymentRecord {
    fn view(&self) -> PaymentView {
        PaymentView {
            payment_id: self.payment_id.clone(),
            job_id: self.job_id.clone(),
            provider_id: self.provider_id.clone(),
            customer_phone: self.customer_phone.masked(),
            customer_name: self.customer_name.clone(),
            amount: self.amount,
            payment_method: self.method,
            status: self.status,
            created_at_millis: self.created_at_millis,
            confirmed_at_millis: self.confirmed_at_millis,
            otp_verified: self.otp.as_ref().is_some_and(|otp| otp.verified),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    config: GatewayConfig,
    limits: GatewayLimits,
    pub faults: GatewayFaults,
    payments: HashMap<PaymentId, PaymentRecord>,
    eviction: BTreeSet<(u64, PaymentId)>,
    outbox: Vec<SmsMessage>,
}

impl MockGateway {
    pub fn new(config: GatewayConfig, limits: GatewayLimits) -> Self {
        Self {
            config,
            limits,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    pub fn initiate_payment(
        &mut self,
        req: InitiatePaymentRequest,
        now_millis: u64,
    ) -> Result<PaymentAck, GatewayError> {
        if self.faults.fail_initiate {
            warn!(provider_id = %req.provider_id, "initiate rejected: injected outage");
            return Err(GatewayError::Unavailable);
        }
        let customer_phone = PhoneNumber::parse(&req.customer_phone, self.config.min_phone_digits)?;
        if req.amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let customer_name = req.customer_name.trim();
        if customer_name.is_empty() {
            return Err(ValidationError::MissingField("customer_name").into());
        }

        let payment_id = PaymentId::generate();
        let record = PaymentRecord {
            payment_id: payment_id.clone(),
            job_id: req.job_id,
            provider_id: req.provider_id,
            customer_phone,
            customer_name: customer_name.to_string(),
            amount: req.amount,
            method: req.payment_method,
            status: PaymentStatus::Pending,
            created_at_millis: now_millis,
            confirmed_at_millis: None,
            otp: None,
        };
        info!(
            payment_id = %payment_id,
            provider_id = %record.provider_id,
            amount = record.amount.value(),
            method = %record.method,
            "payment initiated"
        );
        self.eviction.insert((now_millis, payment_id.clone()));
        self.payments.insert(payment_id.clone(), record);
        self.enforce_limits();

        Ok(PaymentAck {
            payment_id,
            status: PaymentStatus::Pending,
            message: "Paiement initié. Veuillez confirmer sur votre téléphone.".to_string(),
        })
    }

    /// Generates a code, replaces any previous challenge and sends it by SMS.
    pub fn issue_otp(
        &mut self,
        payment_id: &PaymentId,
        now_millis: u64,
    ) -> Result<OtpDispatch, GatewayError> {
        let config = self.config.clone();
        let record = self.pending_record_mut(payment_id)?;
        let previous = match record.otp.as_ref() {
            Some(existing) => {
                let ready_at = existing
                    .issued_at_millis
                    .saturating_add(config.otp_resend_cooldown_ms);
                if now_millis < ready_at {
                    return Err(GatewayError::OtpThrottled {
                        retry_after_secs: (ready_at - now_millis).div_ceil(1000),
                    });
                }
                Some(existing.code.clone())
            }
            None => None,
        };

        let code = OtpCode::random_excluding(&mut thread_rng(), previous.as_ref());
        record.otp = Some(OtpChallenge {
            code: code.clone(),
            issued_at_millis: now_millis,
            attempts: 0,
            verified: false,
        });
        let to = record.customer_phone.clone();
        let dispatch = OtpDispatch {
            payment_id: payment_id.clone(),
            sent_to: to.masked(),
            expires_in_secs: config.otp_ttl_ms / 1000,
            resend_after_secs: config.otp_resend_cooldown_ms / 1000,
        };
        self.outbox.push(SmsMessage {
            payment_id: payment_id.clone(),
            body: format!(
                "ServisPro: votre code de confirmation est {code}. Il expire dans {} minutes.",
                (config.otp_ttl_ms / 60_000).max(1)
            ),
            to,
            code,
            sent_at_millis: now_millis,
        });
        info!(payment_id = %payment_id, sent_to = %dispatch.sent_to, "otp dispatched");
        Ok(dispatch)
    }

    pub fn verify_otp(
        &mut self,
        payment_id: &PaymentId,
        code: &OtpCode,
        now_millis: u64,
    ) -> Result<OtpVerdict, GatewayError> {
        let config = self.config.clone();
        let record = self.pending_record_mut(payment_id)?;
        let challenge = record.otp.as_mut().ok_or(GatewayError::OtpNotIssued)?;
        if now_millis >= challenge.issued_at_millis.saturating_add(config.otp_ttl_ms) {
            return Err(GatewayError::OtpExpired);
        }
        if challenge.attempts >= config.max_otp_attempts {
            return Err(GatewayError::OtpAttemptsExceeded);
        }
        challenge.attempts += 1;
        let verified = challenge.code == *code;
        if verified {
            challenge.verified = true;
        }
        debug!(payment_id = %payment_id, verified, attempts = challenge.attempts, "otp checked");
        Ok(OtpVerdict {
            payment_id: payment_id.clone(),
            verified,
        })
    }

    /// Settles a pending payment. When a server-side code was issued for it,
    /// that code must have been verified first.
    pub fn confirm_payment(
        &mut self,
        payment_id: &PaymentId,
        now_millis: u64,
    ) -> Result<PaymentAck, GatewayError> {
        if self.faults.fail_confirm {
            warn!(payment_id = %payment_id, "confirm rejected: injected outage");
            return Err(GatewayError::Unavailable);
        }
        let record = self.pending_record_mut(payment_id)?;
        if record.otp.as_ref().is_some_and(|otp| !otp.verified) {
            return Err(GatewayError::OtpNotVerified);
        }
        record.status = PaymentStatus::Completed;
        record.confirmed_at_millis = Some(now_millis);
        info!(payment_id = %payment_id, amount = record.amount.value(), "payment confirmed");
        Ok(PaymentAck {
            payment_id: payment_id.clone(),
            status: PaymentStatus::Completed,
            message: "Paiement confirmé".to_string(),
        })
    }

    pub fn get_payment(&self, payment_id: &PaymentId) -> Result<PaymentView, GatewayError> {
        self.payments
            .get(payment_id)
            .map(PaymentRecord::view)
            .ok_or_else(|| GatewayError::UnknownPayment(payment_id.clone()))
    }

    /// Investigation-fee terms: refunded in full when the provider does not
    /// show up, kept when they do.
    pub fn refund_payment(
        &mut self,
        payment_id: &PaymentId,
        reason: RefundReason,
    ) -> Result<RefundAck, GatewayError> {
        let record = self
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::UnknownPayment(payment_id.clone()))?;
        if record.status != PaymentStatus::Completed {
            return Err(GatewayError::NotRefundable(record.status));
        }
        if reason == RefundReason::ProviderAttended {
            return Err(GatewayError::ProviderAttended);
        }
        record.status = PaymentStatus::Refunded;
        info!(payment_id = %payment_id, amount = record.amount.value(), "investigation fee refunded");
        Ok(RefundAck {
            payment_id: payment_id.clone(),
            status: PaymentStatus::Refunded,
            refunded_amount: record.amount,
        })
    }

    pub fn outbox(&self) -> &[SmsMessage] {
        &self.outbox
    }

    /// Most recent code texted for `payment_id`, i.e. what the subscriber reads.
    pub fn last_sms_code(&self, payment_id: &PaymentId) -> Option<OtpCode> {
        self.outbox
            .iter()
            .rev()
            .find(|sms| &sms.payment_id == payment_id)
            .map(|sms| sms.code.clone())
    }

    fn pending_record_mut(
        &mut self,
        payment_id: &PaymentId,
    ) -> Result<&mut PaymentRecord, GatewayError> {
        let record = self
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::UnknownPayment(payment_id.clone()))?;
        if record.status != PaymentStatus::Pending {
            return Err(GatewayError::NotPending(record.status));
        }
        Ok(record)
    }

    fn enforce_limits(&mut self) {
        while self.payments.len() > self.limits.max_payments {
            let Some((_, payment_id)) = self.eviction.pop_first() else {
                break;
            };
            self.payments.remove(&payment_id);
            self.outbox.retain(|sms| sms.payment_id != payment_id);
            debug!(payment_id = %payment_id, "payment record evicted");
        }
    }
}

//! PaymentWizard: the five-step investigation-fee payment dialog.
//!
//! `Info -> OtpSending -> OtpEntry -> Processing -> Success`. Steps only move
//! forward, except that a failed initiation or confirmation returns to `Info`
//! with the form inputs intact. Timed transitions are stored as deadlines and
//! driven by [`PaymentWizard::advance`]; every await races the close signal,
//! so a closed wizard never changes state or fires callbacks afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::{thread_rng, Rng};
use servispro_types::{
    AuthSession, Gnf, InitiatePaymentRequest, JobId, OtpCode, PaymentMethod, PhoneNumber,
    ProviderId, ProviderProfile, TransactionReceipt, TransactionRef, ValidationError,
    MIN_PHONE_DIGITS,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::otp::{OtpChannel, OtpError};
use crate::session::{NoticeLevel, PaymentSession, Step, WizardNotice};
use crate::transport::{PaymentTransport, TransportError};

pub const MSG_INVALID_PHONE: &str = "Veuillez entrer un numéro de téléphone valide";
pub const MSG_INVALID_CODE: &str = "Veuillez entrer le code à 6 chiffres";
pub const MSG_CODE_MISMATCH: &str = "Code incorrect. Veuillez réessayer.";
pub const MSG_INITIATE_FAILED: &str = "Erreur lors du paiement";
pub const MSG_CONFIRM_FAILED: &str = "Erreur lors de la confirmation du paiement";
pub const MSG_CONFIRMED: &str = "Paiement confirmé avec succès!";
const MSG_OTP_FAILED: &str = "Erreur lors de l'envoi du code";
const MSG_VERIFY_FAILED: &str = "Erreur lors de la vérification du code";

#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Pause between issuing a code and showing the entry step.
    pub reveal_delay: Duration,
    pub processing_delay_min: Duration,
    pub processing_delay_max: Duration,
    pub resend_cooldown: Duration,
    pub min_phone_digits: usize,
    /// Upper bound on initiate/confirm round trips.
    pub remote_timeout: Duration,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            reveal_delay: Duration::from_secs(2),
            processing_delay_min: Duration::from_secs(2),
            processing_delay_max: Duration::from_secs(4),
            resend_cooldown: Duration::from_secs(60),
            min_phone_digits: MIN_PHONE_DIGITS,
            remote_timeout: Duration::from_secs(10),
        }
    }
}

impl WizardConfig {
    /// Uniform pick in `[processing_delay_min, processing_delay_max]`.
    pub fn processing_delay(&self) -> Duration {
        let min = self.processing_delay_min.as_millis() as u64;
        let max = self.processing_delay_max.as_millis() as u64;
        if max <= min {
            return self.processing_delay_min;
        }
        Duration::from_millis(thread_rng().gen_range(min..=max))
    }
}

/// What the embedding page passes in when it opens the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub provider_id: ProviderId,
    pub beneficiary_name: String,
    pub customer_name: String,
    /// Prefills the phone field.
    pub customer_phone: Option<String>,
    pub amount: Gnf,
    pub method: PaymentMethod,
    pub job_id: Option<JobId>,
}

impl PaymentRequest {
    /// Investigation fee owed to `provider`, paid by whoever `session` is.
    pub fn investigation_fee(provider: &ProviderProfile, session: &AuthSession) -> Self {
        Self {
            provider_id: provider.id.clone(),
            beneficiary_name: provider.display_name(),
            customer_name: session.payer_name(),
            customer_phone: session.payer_phone().map(str::to_string),
            amount: provider.investigation_fee(),
            method: PaymentMethod::default(),
            job_id: None,
        }
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

#[derive(Default)]
pub struct WizardCallbacks {
    on_close: Option<Box<dyn FnMut()>>,
    on_payment_success: Option<Box<dyn FnOnce(TransactionReceipt)>>,
}

impl WizardCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_close(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn on_payment_success(mut self, f: impl FnOnce(TransactionReceipt) + 'static) -> Self {
        self.on_payment_success = Some(Box::new(f));
        self
    }
}

/// Closes the wizard from outside, including while an operation is awaiting.
/// Bound to the session that was open when it was taken; once that session
/// ends, the handle has no effect on later ones.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("payment wizard is not open")]
    NotOpen,
    #[error("payment wizard was closed")]
    Closed,
    #[error("`{action}` is not allowed in step {step}")]
    InvalidStep { step: Step, action: &'static str },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("one-time code does not match")]
    OtpMismatch,
    #[error("payment was not initiated")]
    MissingPaymentId,
    #[error("payment initiation failed: {0}")]
    Initiate(TransportError),
    #[error("payment confirmation failed: {0}")]
    Confirm(TransportError),
    #[error(transparent)]
    Otp(#[from] OtpError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    Throttled { remaining_secs: u64 },
}

pub struct PaymentWizard<T: PaymentTransport, O: OtpChannel> {
    transport: T,
    otp: O,
    config: WizardConfig,
    session: Option<PaymentSession>,
    request: Option<PaymentRequest>,
    callbacks: WizardCallbacks,
    notices: Vec<WizardNotice>,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
}

impl<T: PaymentTransport, O: OtpChannel> PaymentWizard<T, O> {
    pub fn new(transport: T, otp: O, config: WizardConfig) -> Self {
        let (tx, rx) = watch::channel(true);
        Self {
            transport,
            otp,
            config,
            session: None,
            request: None,
            callbacks: WizardCallbacks::default(),
            notices: Vec::new(),
            close_tx: Arc::new(tx),
            close_rx: rx,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn otp_channel(&self) -> &O {
        &self.otp
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    /// Handle for the current session.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            tx: Arc::clone(&self.close_tx),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some() && !*self.close_rx.borrow()
    }

    pub fn session(&self) -> Option<&PaymentSession> {
        self.session.as_ref()
    }

    /// Drains the toast queue.
    pub fn take_notices(&mut self) -> Vec<WizardNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Starts a fresh session in `Info`. Reopening discards the previous one
    /// without calling its `on_close`.
    pub fn open(&mut self, request: PaymentRequest, callbacks: WizardCallbacks) {
        if self.session.is_some() {
            self.teardown(false);
        }
        let phone_input = request.customer_phone.clone().unwrap_or_default();
        info!(
            provider_id = %request.provider_id,
            amount = request.amount.value(),
            method = %request.method,
            "payment wizard opened"
        );
        self.session = Some(PaymentSession::new(
            request.method,
            phone_input,
            request.amount,
        ));
        self.request = Some(request);
        self.callbacks = callbacks;
        self.notices.clear();
        let (tx, rx) = watch::channel(false);
        self.close_tx = Arc::new(tx);
        self.close_rx = rx;
    }

    /// Closes from any step, dropping every pending timer.
    pub fn close(&mut self) {
        if self.session.is_some() {
            self.teardown(true);
        }
    }

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), WizardError> {
        let session = self.session_in(Step::Info, "select_method")?;
        session.payment_method = method;
        Ok(())
    }

    pub fn set_phone_number(&mut self, input: &str) -> Result<(), WizardError> {
        let session = self.session_in(Step::Info, "set_phone_number")?;
        session.phone_input = input.to_string();
        session.error = None;
        Ok(())
    }

    pub fn set_entered_code(&mut self, input: &str) -> Result<(), WizardError> {
        let session = self.session_in(Step::OtpEntry, "set_entered_code")?;
        session.entered_code = input.trim().to_string();
        session.error = None;
        Ok(())
    }

    /// Validates the phone, initiates the payment and issues a code. Ends in
    /// `OtpSending`; call [`advance`](Self::advance) to reveal the entry step.
    pub async fn submit_payment(&mut self) -> Result<Step, WizardError> {
        let min_digits = self.config.min_phone_digits;
        let session = self.session_in(Step::Info, "submit_payment")?;
        let phone = match PhoneNumber::parse(&session.phone_input, min_digits) {
            Ok(phone) => phone,
            Err(err) => {
                session.error = Some(MSG_INVALID_PHONE.to_string());
                self.notify(NoticeLevel::Error, MSG_INVALID_PHONE);
                return Err(err.into());
            }
        };
        session.phone_number = Some(phone.clone());
        session.error = None;
        session.step = Step::OtpSending;
        let method = session.payment_method;
        let amount = session.amount;

        let request = self.request.as_ref().ok_or(WizardError::NotOpen)?;
        let initiate = InitiatePaymentRequest {
            job_id: request
                .job_id
                .clone()
                .unwrap_or_else(|| JobId::provisional(crate::unix_millis_now())),
            provider_id: request.provider_id.clone(),
            customer_phone: phone.as_str().to_string(),
            customer_name: request.customer_name.clone(),
            amount,
            payment_method: method,
        };

        let mut close_rx = self.close_rx.clone();
        let initiated = race_close(
            &mut close_rx,
            with_timeout(
                self.config.remote_timeout,
                self.transport.initiate_payment(initiate),
            ),
        )
        .await;
        let ack = match initiated {
            None => return Err(self.abort_closed()),
            Some(Err(err)) => {
                let detail = err.detail().map(str::to_string);
                return Err(self.fail_to_info(MSG_INITIATE_FAILED, detail, WizardError::Initiate(err)));
            }
            Some(Ok(ack)) => ack,
        };
        let payment_id = ack.payment_id;
        info!(payment_id = %payment_id, method = %method, phone = %phone.masked(), "payment initiated");
        if let Some(session) = self.session.as_mut() {
            session.payment_id = Some(payment_id.clone());
        }

        let delivery = match race_close(&mut close_rx, self.otp.issue(&payment_id, &phone)).await {
            None => return Err(self.abort_closed()),
            Some(Err(err)) => {
                let detail = err.detail().map(str::to_string);
                self.otp.discard(&payment_id);
                return Err(self.fail_to_info(MSG_OTP_FAILED, detail, err.into()));
            }
            Some(Ok(delivery)) => delivery,
        };
        let reveal_at = Instant::now() + self.config.reveal_delay;
        let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
        session.apply_delivery(delivery);
        session.reveal_at = Some(reveal_at);
        Ok(Step::OtpSending)
    }

    /// Waits out the pending timer of a timed step and performs its transition.
    /// Returns the current step unchanged when nothing is pending.
    pub async fn advance(&mut self) -> Result<Step, WizardError> {
        self.ensure_open()?;
        let step = self
            .session
            .as_ref()
            .map(PaymentSession::step)
            .ok_or(WizardError::NotOpen)?;
        match step {
            Step::OtpSending => self.reveal_code().await,
            Step::Processing => self.confirm().await,
            other => Ok(other),
        }
    }

    /// Checks the entered code. A match moves to `Processing` and arms the
    /// confirmation timer; a mismatch keeps `OtpEntry` with an inline error.
    pub async fn submit_code(&mut self) -> Result<Step, WizardError> {
        let session = self.session_in(Step::OtpEntry, "submit_code")?;
        let code = match OtpCode::parse(&session.entered_code) {
            Ok(code) => code,
            Err(err) => {
                session.error = Some(MSG_INVALID_CODE.to_string());
                return Err(err.into());
            }
        };
        let payment_id = session
            .payment_id
            .clone()
            .ok_or(WizardError::MissingPaymentId)?;

        let mut close_rx = self.close_rx.clone();
        let verdict = match race_close(&mut close_rx, self.otp.verify(&payment_id, &code)).await {
            None => return Err(self.abort_closed()),
            Some(verdict) => verdict,
        };
        let processing_delay = self.config.processing_delay();
        match verdict {
            Ok(true) => {
                let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
                session.step = Step::Processing;
                session.error = None;
                session.processing_until = Some(Instant::now() + processing_delay);
                info!(
                    payment_id = %payment_id,
                    delay_ms = processing_delay.as_millis() as u64,
                    "one-time code accepted"
                );
                Ok(Step::Processing)
            }
            Ok(false) => {
                debug!(payment_id = %payment_id, "one-time code rejected");
                self.set_error(MSG_CODE_MISMATCH, false);
                Err(WizardError::OtpMismatch)
            }
            Err(err) => {
                let message = err.detail().unwrap_or(MSG_VERIFY_FAILED).to_string();
                self.set_error(&message, true);
                Err(err.into())
            }
        }
    }

    /// Issues a new code once the cooldown has run out.
    pub async fn resend_code(&mut self) -> Result<ResendOutcome, WizardError> {
        let session = self.session_in(Step::OtpEntry, "resend_code")?;
        let remaining_secs = session.resend_cooldown_seconds();
        if remaining_secs > 0 {
            return Ok(ResendOutcome::Throttled { remaining_secs });
        }
        let payment_id = session
            .payment_id
            .clone()
            .ok_or(WizardError::MissingPaymentId)?;
        let phone = session
            .phone_number
            .clone()
            .ok_or(ValidationError::MissingField("phone_number"))?;

        let mut close_rx = self.close_rx.clone();
        let delivery = match race_close(&mut close_rx, self.otp.issue(&payment_id, &phone)).await {
            None => return Err(self.abort_closed()),
            Some(Err(err)) => {
                let message = err.detail().unwrap_or(MSG_OTP_FAILED).to_string();
                self.set_error(&message, true);
                return Err(err.into());
            }
            Some(Ok(delivery)) => delivery,
        };
        let cooldown = self.config.resend_cooldown;
        let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
        session.apply_delivery(delivery);
        session.entered_code.clear();
        session.error = None;
        session.resend_ready_at = Some(Instant::now() + cooldown);
        info!(payment_id = %payment_id, "one-time code reissued");
        Ok(ResendOutcome::Sent)
    }

    /// Hands the receipt to `on_payment_success` and tears the wizard down.
    pub fn acknowledge(&mut self) -> Result<TransactionReceipt, WizardError> {
        let session = self.session_in(Step::Success, "acknowledge")?;
        let receipt = session
            .receipt
            .clone()
            .ok_or(ValidationError::MissingField("receipt"))?;
        if let Some(on_success) = self.callbacks.on_payment_success.take() {
            on_success(receipt.clone());
        }
        info!(reference = %receipt.reference, "payment receipt acknowledged");
        self.teardown(false);
        Ok(receipt)
    }

    async fn reveal_code(&mut self) -> Result<Step, WizardError> {
        let reveal_at = self
            .session
            .as_ref()
            .and_then(|session| session.reveal_at)
            .unwrap_or_else(Instant::now);
        let mut close_rx = self.close_rx.clone();
        if race_close(&mut close_rx, tokio::time::sleep_until(reveal_at))
            .await
            .is_none()
        {
            return Err(self.abort_closed());
        }

        let cooldown = self.config.resend_cooldown;
        let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
        session.step = Step::OtpEntry;
        session.reveal_at = None;
        session.resend_ready_at = Some(Instant::now() + cooldown);
        let notice = match (&session.generated_code, &session.otp_dispatch) {
            (Some(code), _) => format!("Votre code de confirmation : {}", code.as_str()),
            (None, Some(dispatch)) => format!("Code envoyé au {}", dispatch.sent_to),
            (None, None) => "Code envoyé".to_string(),
        };
        self.notify(NoticeLevel::Info, &notice);
        Ok(Step::OtpEntry)
    }

    async fn confirm(&mut self) -> Result<Step, WizardError> {
        let (payment_id, until) = {
            let session = self.session.as_ref().ok_or(WizardError::NotOpen)?;
            (
                session.payment_id.clone(),
                session.processing_until.unwrap_or_else(Instant::now),
            )
        };
        let Some(payment_id) = payment_id else {
            return Err(self.fail_to_info(MSG_CONFIRM_FAILED, None, WizardError::MissingPaymentId));
        };

        let mut close_rx = self.close_rx.clone();
        if race_close(&mut close_rx, tokio::time::sleep_until(until))
            .await
            .is_none()
        {
            return Err(self.abort_closed());
        }
        let confirmed = race_close(
            &mut close_rx,
            with_timeout(
                self.config.remote_timeout,
                self.transport.confirm_payment(&payment_id),
            ),
        )
        .await;
        match confirmed {
            None => Err(self.abort_closed()),
            Some(Err(err)) => {
                self.otp.discard(&payment_id);
                Err(self.fail_to_info(MSG_CONFIRM_FAILED, None, WizardError::Confirm(err)))
            }
            Some(Ok(_)) => {
                let beneficiary_name = self
                    .request
                    .as_ref()
                    .map(|request| request.beneficiary_name.clone())
                    .unwrap_or_default();
                let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
                let phone_number = session
                    .phone_number
                    .clone()
                    .ok_or(ValidationError::MissingField("phone_number"))?;
                let now = Utc::now();
                let reference = TransactionRef::generate(
                    session.payment_method,
                    now.timestamp_millis().max(0) as u64,
                    &mut thread_rng(),
                );
                session.receipt = Some(TransactionReceipt {
                    reference: reference.clone(),
                    date_time: now,
                    method: session.payment_method,
                    phone_number,
                    beneficiary_name,
                    amount: session.amount,
                });
                session.transaction_ref = Some(reference.clone());
                session.transaction_date = Some(now);
                session.step = Step::Success;
                session.processing_until = None;
                session.resend_ready_at = None;
                session.error = None;
                info!(payment_id = %payment_id, reference = %reference, "payment confirmed");
                self.notify(NoticeLevel::Success, MSG_CONFIRMED);
                Ok(Step::Success)
            }
        }
    }

    fn ensure_open(&mut self) -> Result<(), WizardError> {
        if self.session.is_none() {
            return Err(WizardError::NotOpen);
        }
        let closed = *self.close_rx.borrow();
        if closed {
            self.teardown(true);
            return Err(WizardError::Closed);
        }
        Ok(())
    }

    fn session_in(
        &mut self,
        expected: Step,
        action: &'static str,
    ) -> Result<&mut PaymentSession, WizardError> {
        self.ensure_open()?;
        let session = self.session.as_mut().ok_or(WizardError::NotOpen)?;
        if session.step != expected {
            return Err(WizardError::InvalidStep {
                step: session.step,
                action,
            });
        }
        Ok(session)
    }

    fn fail_to_info(
        &mut self,
        fallback: &str,
        detail: Option<String>,
        err: WizardError,
    ) -> WizardError {
        let message = detail.unwrap_or_else(|| fallback.to_string());
        if let Some(session) = self.session.as_mut() {
            session.reset_to_info();
            session.error = Some(message.clone());
        }
        warn!(error = %err, "payment wizard returned to info");
        self.notify(NoticeLevel::Error, &message);
        err
    }

    fn set_error(&mut self, message: &str, toast: bool) {
        if let Some(session) = self.session.as_mut() {
            session.error = Some(message.to_string());
        }
        if toast {
            self.notify(NoticeLevel::Error, message);
        }
    }

    fn abort_closed(&mut self) -> WizardError {
        self.teardown(true);
        WizardError::Closed
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => warn!(notice = message, "payment wizard notice"),
            _ => debug!(notice = message, "payment wizard notice"),
        }
        self.notices.push(WizardNotice {
            level,
            message: message.to_string(),
        });
    }

    fn teardown(&mut self, notify_close: bool) {
        if let Some(session) = self.session.take() {
            if let Some(payment_id) = session.payment_id.as_ref() {
                self.otp.discard(payment_id);
            }
            debug!(step = %session.step, "payment session discarded");
        }
        self.request = None;
        let mut callbacks = std::mem::take(&mut self.callbacks);
        if notify_close {
            if let Some(on_close) = callbacks.on_close.as_mut() {
                on_close();
            }
        }
        self.close_tx.send_replace(true);
    }
}

/// `None` when the close signal fires before `fut` completes.
async fn race_close<F: Future>(close_rx: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = close_rx.wait_for(|closed| *closed) => None,
        output = fut => Some(output),
    }
}

async fn with_timeout<R>(
    limit: Duration,
    fut: impl Future<Output = Result<R, TransportError>>,
) -> Result<R, TransportError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(TransportError::Timeout))
}

//! End-to-end wizard flows against the in-process gateway.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use servispro_client::{
    DemoOtpChannel, MockTransport, NoticeLevel, OtpChannel, PaymentRequest, PaymentTransport,
    PaymentWizard, RemoteOtpChannel, ResendOutcome, Step, WizardCallbacks, WizardConfig,
    WizardError, DEMO_BYPASS_CODE,
};
use servispro_gateway_mock::{DemoScenario, DEMO_INVESTIGATION_FEE, DEMO_PHONE};
use servispro_types::{PaymentMethod, PaymentStatus, RefundReason, TransactionRef};

#[derive(Default)]
struct CallbackLog {
    closes: RefCell<usize>,
    receipts: RefCell<Vec<servispro_types::TransactionReceipt>>,
}

fn logged_callbacks(log: &Rc<CallbackLog>) -> WizardCallbacks {
    WizardCallbacks::new()
        .on_close({
            let log = Rc::clone(log);
            move || *log.closes.borrow_mut() += 1
        })
        .on_payment_success({
            let log = Rc::clone(log);
            move |receipt| log.receipts.borrow_mut().push(receipt)
        })
}

fn demo_wizard() -> (
    PaymentWizard<MockTransport, DemoOtpChannel>,
    PaymentRequest,
    MockTransport,
) {
    let scenario = DemoScenario::new();
    let request = PaymentRequest::investigation_fee(&scenario.provider, &scenario.customer);
    let transport = MockTransport::new(scenario.gateway);
    let wizard = PaymentWizard::new(
        transport.clone(),
        DemoOtpChannel::new(),
        WizardConfig::default(),
    );
    (wizard, request, transport)
}

async fn to_otp_entry<T: PaymentTransport, O: OtpChannel>(wizard: &mut PaymentWizard<T, O>) {
    assert_eq!(wizard.submit_payment().await.unwrap(), Step::OtpSending);
    assert_eq!(wizard.advance().await.unwrap(), Step::OtpEntry);
}

fn is_reference(value: &str) -> bool {
    let digits = value
        .strip_prefix("OM")
        .or_else(|| value.strip_prefix("MTN"));
    digits.is_some_and(|digits| digits.len() == 12 && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[tokio::test(start_paused = true)]
async fn bypass_code_pays_fee_and_builds_receipt() {
    let (mut wizard, request, transport) = demo_wizard();
    let log = Rc::new(CallbackLog::default());
    wizard.open(request, logged_callbacks(&log));
    assert_eq!(wizard.session().unwrap().phone_input(), DEMO_PHONE);

    to_otp_entry(&mut wizard).await;
    let generated = wizard.session().unwrap().generated_code().unwrap().clone();
    assert_eq!(generated.as_str().len(), 6);
    let notices = wizard.take_notices();
    assert!(notices
        .iter()
        .any(|notice| notice.level == NoticeLevel::Info && notice.message.contains(generated.as_str())));

    wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
    assert_eq!(wizard.submit_code().await.unwrap(), Step::Processing);
    assert_eq!(wizard.advance().await.unwrap(), Step::Success);

    let session = wizard.session().unwrap();
    let reference = session.transaction_ref().unwrap();
    assert!(is_reference(reference.as_str()));
    assert!(reference.as_str().starts_with("OM"));
    assert!(session.transaction_date().is_some());

    let receipt = wizard.acknowledge().unwrap();
    assert_eq!(receipt.amount, DEMO_INVESTIGATION_FEE);
    assert!(receipt.to_string().contains("Montant : 50 000 GNF"));
    assert_eq!(receipt.method, PaymentMethod::OrangeMoney);
    assert_eq!(receipt.phone_number.as_str(), DEMO_PHONE);
    assert_eq!(TransactionRef::parse(receipt.reference.as_str()), Ok(receipt.reference.clone()));

    assert_eq!(log.receipts.borrow().len(), 1);
    assert_eq!(*log.closes.borrow(), 0);
    let counts = transport.call_counts();
    assert_eq!((counts.initiate, counts.confirm), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn mtn_payment_gets_mtn_reference() {
    let (mut wizard, request, _) = demo_wizard();
    wizard.open(request, WizardCallbacks::new());
    wizard.select_method(PaymentMethod::MtnMomo).unwrap();
    wizard.set_phone_number("+224 664 12 34 56").unwrap();
    to_otp_entry(&mut wizard).await;
    let code = wizard.session().unwrap().generated_code().unwrap().clone();
    wizard.set_entered_code(code.as_str()).unwrap();
    wizard.submit_code().await.unwrap();
    wizard.advance().await.unwrap();
    let reference = wizard.session().unwrap().transaction_ref().unwrap().clone();
    assert!(reference.as_str().starts_with("MTN"));
    assert!(is_reference(reference.as_str()));
}

#[tokio::test(start_paused = true)]
async fn invalid_phone_blocks_without_network() {
    let (mut wizard, request, transport) = demo_wizard();
    wizard.open(request, WizardCallbacks::new());
    for input in ["", "62 00 00", "62000000x"] {
        wizard.set_phone_number(input).unwrap();
        assert!(matches!(
            wizard.submit_payment().await,
            Err(WizardError::Validation(_))
        ));
        assert_eq!(wizard.session().unwrap().step(), Step::Info);
    }
    assert_eq!(transport.call_counts().initiate, 0);
    let notices = wizard.take_notices();
    assert_eq!(notices.len(), 3);
    assert!(notices.iter().all(|notice| notice.level == NoticeLevel::Error));
}

#[tokio::test(start_paused = true)]
async fn short_code_is_rejected_before_comparison() {
    let (mut wizard, request, _) = demo_wizard();
    wizard.open(request, WizardCallbacks::new());
    to_otp_entry(&mut wizard).await;
    wizard.set_entered_code("12345").unwrap();
    assert!(matches!(
        wizard.submit_code().await,
        Err(WizardError::Validation(_))
    ));
    assert_eq!(wizard.session().unwrap().step(), Step::OtpEntry);
}

#[tokio::test(start_paused = true)]
async fn resend_countdown_then_new_code() {
    let (mut wizard, request, _) = demo_wizard();
    wizard.open(request, WizardCallbacks::new());
    to_otp_entry(&mut wizard).await;
    assert_eq!(wizard.session().unwrap().resend_cooldown_seconds(), 60);

    let before = wizard.session().unwrap().generated_code().unwrap().clone();
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(wizard.session().unwrap().resend_cooldown_seconds(), 59);
    assert_eq!(
        wizard.resend_code().await.unwrap(),
        ResendOutcome::Throttled { remaining_secs: 59 }
    );
    let session = wizard.session().unwrap();
    assert_eq!(session.generated_code(), Some(&before));
    assert_eq!(session.resend_cooldown_seconds(), 59);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(wizard.resend_code().await.unwrap(), ResendOutcome::Sent);
    let session = wizard.session().unwrap();
    assert_ne!(session.generated_code().unwrap(), &before);
    assert_eq!(session.resend_cooldown_seconds(), 60);
}

#[tokio::test(start_paused = true)]
async fn confirm_outage_returns_to_info_and_allows_retry() {
    let (mut wizard, request, transport) = demo_wizard();
    let log = Rc::new(CallbackLog::default());
    wizard.open(request, logged_callbacks(&log));
    to_otp_entry(&mut wizard).await;
    wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
    wizard.submit_code().await.unwrap();

    transport
        .with_gateway(|gateway| gateway.faults.fail_confirm = true)
        .unwrap();
    assert!(matches!(
        wizard.advance().await,
        Err(WizardError::Confirm(_))
    ));
    let session = wizard.session().unwrap();
    assert_eq!(session.step(), Step::Info);
    assert_eq!(
        session.error(),
        Some("Erreur lors de la confirmation du paiement")
    );
    assert_eq!(session.phone_input(), DEMO_PHONE);
    assert!(log.receipts.borrow().is_empty());

    transport
        .with_gateway(|gateway| gateway.faults.fail_confirm = false)
        .unwrap();
    to_otp_entry(&mut wizard).await;
    wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
    wizard.submit_code().await.unwrap();
    assert_eq!(wizard.advance().await.unwrap(), Step::Success);
    assert_eq!(transport.call_counts().initiate, 2);
}

#[tokio::test(start_paused = true)]
async fn closing_during_processing_cancels_confirmation() {
    let (mut wizard, request, transport) = demo_wizard();
    let log = Rc::new(CallbackLog::default());
    wizard.open(request, logged_callbacks(&log));
    to_otp_entry(&mut wizard).await;
    wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
    assert_eq!(wizard.submit_code().await.unwrap(), Step::Processing);

    let handle = wizard.close_handle();
    let (result, ()) = tokio::join!(wizard.advance(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.close();
    });
    assert_eq!(result, Err(WizardError::Closed));
    assert!(!wizard.is_open());
    assert_eq!(transport.call_counts().confirm, 0);
    assert_eq!(*log.closes.borrow(), 1);
    assert!(log.receipts.borrow().is_empty());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(wizard.advance().await, Err(WizardError::NotOpen));
    assert_eq!(transport.call_counts().confirm, 0);
}

#[tokio::test(start_paused = true)]
async fn reopening_starts_a_fresh_session() {
    let (mut wizard, request, _) = demo_wizard();
    let log = Rc::new(CallbackLog::default());
    wizard.open(request.clone(), logged_callbacks(&log));
    wizard.select_method(PaymentMethod::MtnMomo).unwrap();
    to_otp_entry(&mut wizard).await;

    wizard.close();
    assert_eq!(*log.closes.borrow(), 1);
    assert!(wizard.session().is_none());

    wizard.open(request, WizardCallbacks::new());
    let session = wizard.session().unwrap();
    assert_eq!(session.step(), Step::Info);
    assert_eq!(session.payment_method(), PaymentMethod::OrangeMoney);
    assert!(session.payment_id().is_none());
    assert!(session.generated_code().is_none());
    assert!(session.entered_code().is_empty());
    assert_eq!(session.resend_cooldown_seconds(), 0);
}

#[tokio::test(start_paused = true)]
async fn remote_code_stays_server_side_and_gates_confirm() {
    let scenario = DemoScenario::new();
    let request = PaymentRequest::investigation_fee(&scenario.provider, &scenario.customer);
    let transport = MockTransport::new(scenario.gateway);
    let mut wizard = PaymentWizard::new(
        transport.clone(),
        RemoteOtpChannel::new(transport.clone()),
        WizardConfig::default(),
    );
    wizard.open(request, WizardCallbacks::new());
    to_otp_entry(&mut wizard).await;

    let session = wizard.session().unwrap();
    assert!(session.generated_code().is_none());
    let payment_id = session.payment_id().unwrap().clone();
    let texted = transport
        .with_gateway(|gateway| gateway.last_sms_code(&payment_id))
        .unwrap()
        .unwrap();
    assert!(wizard
        .take_notices()
        .iter()
        .all(|notice| !notice.message.contains(texted.as_str())));

    let premature = transport.confirm_payment(&payment_id).await.unwrap_err();
    assert_eq!(
        premature.detail(),
        Some("Le code de confirmation n'a pas été vérifié")
    );

    if texted.as_str() != DEMO_BYPASS_CODE {
        wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
        assert_eq!(wizard.submit_code().await, Err(WizardError::OtpMismatch));
    }
    wizard.set_entered_code(texted.as_str()).unwrap();
    assert_eq!(wizard.submit_code().await.unwrap(), Step::Processing);
    assert_eq!(wizard.advance().await.unwrap(), Step::Success);
    let view = transport.get_payment(&payment_id).await.unwrap();
    assert_eq!(view.status, PaymentStatus::Completed);
    assert!(view.otp_verified);
}

#[tokio::test(start_paused = true)]
async fn no_show_refunds_the_fee() {
    let (mut wizard, request, transport) = demo_wizard();
    wizard.open(request, WizardCallbacks::new());
    to_otp_entry(&mut wizard).await;
    let payment_id = wizard.session().unwrap().payment_id().unwrap().clone();
    wizard.set_entered_code(DEMO_BYPASS_CODE).unwrap();
    wizard.submit_code().await.unwrap();
    wizard.advance().await.unwrap();
    wizard.acknowledge().unwrap();

    let refused = transport
        .refund_payment(&payment_id, RefundReason::ProviderAttended)
        .await
        .unwrap_err();
    assert!(refused.detail().is_some());
    let ack = transport
        .refund_payment(&payment_id, RefundReason::ProviderNoShow)
        .await
        .unwrap();
    assert_eq!(ack.refunded_amount, DEMO_INVESTIGATION_FEE);
    assert_eq!(ack.status, PaymentStatus::Refunded);
}

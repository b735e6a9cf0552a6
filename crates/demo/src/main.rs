use std::cell::RefCell;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use clap::Parser;
use servispro_client::{
    DemoOtpChannel, HttpTransport, MockTransport, NoticeLevel, OtpChannel, PaymentRequest,
    PaymentSession, PaymentTransport, PaymentWizard, RemoteOtpChannel, ResendOutcome,
    TransportConfig, WizardCallbacks, WizardConfig,
};
use servispro_gateway_mock::{DemoScenario, DEMO_PHONE};
use servispro_types::{Gnf, PaymentMethod, TransactionReceipt};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Pays a ServisPro investigation fee end to end")]
struct Cli {
    /// Amount in GNF. Defaults to the demo provider's investigation fee.
    #[arg(long)]
    amount: Option<u64>,

    /// `orange_money` or `mtn_momo`.
    #[arg(long, default_value = "orange_money")]
    method: PaymentMethod,

    #[arg(long, default_value = DEMO_PHONE)]
    phone: String,

    /// Pay through a running servispro-backend; the code then arrives by SMS
    /// and is read from stdin.
    #[arg(long)]
    backend_url: Option<String>,
}

type DemoResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> DemoResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let scenario = DemoScenario::new();
    let mut request = PaymentRequest::investigation_fee(&scenario.provider, &scenario.customer);
    if let Some(amount) = cli.amount {
        request.amount = Gnf::new(amount);
    }
    request.method = cli.method;

    let receipt = match cli.backend_url {
        Some(base_url) => {
            info!(backend = %base_url, "using REST backend");
            let transport = HttpTransport::new(TransportConfig {
                base_url,
                ..TransportConfig::default()
            })?;
            let wizard = PaymentWizard::new(
                transport.clone(),
                RemoteOtpChannel::new(transport),
                WizardConfig::default(),
            );
            pay(wizard, request, &cli.phone, prompt_for_code).await?
        }
        None => {
            info!("using in-process gateway");
            let wizard = PaymentWizard::new(
                MockTransport::new(scenario.gateway),
                DemoOtpChannel::new(),
                WizardConfig::default(),
            );
            pay(wizard, request, &cli.phone, disclosed_code).await?
        }
    };

    println!("{receipt}");
    Ok(())
}

async fn pay<T, O>(
    mut wizard: PaymentWizard<T, O>,
    request: PaymentRequest,
    phone: &str,
    read_code: impl Fn(&PaymentSession) -> DemoResult<String>,
) -> DemoResult<TransactionReceipt>
where
    T: PaymentTransport,
    O: OtpChannel,
{
    let handed_off = Rc::new(RefCell::new(None));
    let callbacks = WizardCallbacks::new()
        .on_payment_success({
            let handed_off = Rc::clone(&handed_off);
            move |receipt| *handed_off.borrow_mut() = Some(receipt)
        })
        .on_close(|| warn!("payment wizard closed before completion"));

    info!(
        beneficiary = %request.beneficiary_name,
        amount = %request.amount,
        "investigation fee due before the provider travels"
    );
    wizard.open(request, callbacks);
    wizard.set_phone_number(phone)?;

    wizard.submit_payment().await?;
    info!("sending confirmation code");
    wizard.advance().await?;
    log_notices(&mut wizard);

    if let ResendOutcome::Throttled { remaining_secs } = wizard.resend_code().await? {
        info!(remaining_secs, "resend available later");
    }

    let session = wizard.session().ok_or("payment wizard is not open")?;
    let code = read_code(session)?;
    wizard.set_entered_code(&code)?;
    wizard.submit_code().await?;
    info!("processing payment");
    wizard.advance().await?;
    log_notices(&mut wizard);

    let receipt = wizard.acknowledge()?;
    if handed_off.borrow().as_ref() != Some(&receipt) {
        return Err("completion callback did not receive the receipt".into());
    }
    info!(reference = %receipt.reference, "payment complete");
    Ok(receipt)
}

fn disclosed_code(session: &PaymentSession) -> DemoResult<String> {
    let code = session
        .generated_code()
        .ok_or("demo channel did not disclose a code")?;
    Ok(code.as_str().to_string())
}

fn prompt_for_code(session: &PaymentSession) -> DemoResult<String> {
    let sent_to = session
        .otp_dispatch()
        .map(|dispatch| dispatch.sent_to.clone())
        .unwrap_or_default();
    print!("Code reçu au {sent_to} : ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn log_notices<T: PaymentTransport, O: OtpChannel>(wizard: &mut PaymentWizard<T, O>) {
    for notice in wizard.take_notices() {
        match notice.level {
            NoticeLevel::Error => warn!(notice = %notice.message, "wizard"),
            _ => info!(notice = %notice.message, "wizard"),
        }
    }
}

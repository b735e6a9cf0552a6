//! Payment-domain values: methods, GNF amounts, phone numbers, one-time codes,
//! transaction references and receipts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_PHONE_DIGITS: usize = 9;
pub const OTP_LEN: usize = 6;

/// Mobile-money operator used to pay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    OrangeMoney,
    MtnMomo,
}

impl PaymentMethod {
    /// Tag that opens every transaction reference for this operator.
    pub const fn reference_prefix(self) -> &'static str {
        match self {
            Self::OrangeMoney => "OM",
            Self::MtnMomo => "MTN",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::OrangeMoney => "Orange Money",
            Self::MtnMomo => "MTN Mobile Money",
        }
    }

    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::OrangeMoney => "orange_money",
            Self::MtnMomo => "mtn_momo",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orange_money" => Ok(Self::OrangeMoney),
            "mtn_momo" => Ok(Self::MtnMomo),
            other => Err(ValidationError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// Whole Guinean francs. GNF has no minor unit in circulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gnf(u64);

impl Gnf {
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Gnf {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Renders `50 000 GNF`: thousands grouped by a single space.
impl fmt::Display for Gnf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (idx, ch) in digits.chars().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                grouped.push(' ');
            }
            grouped.push(ch);
        }
        write!(f, "{grouped} GNF")
    }
}

/// Subscriber number, normalized to its digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Accepts digits with optional spaces, dashes, dots and a leading `+`.
    pub fn parse(input: &str, min_digits: usize) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let mut digits = String::with_capacity(body.len());
        for ch in body.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '-' | '.' => {}
                other => return Err(ValidationError::PhoneInvalidChar(other)),
            }
        }
        if digits.len() < min_digits {
            return Err(ValidationError::PhoneTooShort {
                min: min_digits,
                actual: digits.len(),
            });
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keeps the first and last two digits, e.g. `62*****00`.
    pub fn masked(&self) -> String {
        let len = self.0.len();
        if len <= 4 {
            return "*".repeat(len);
        }
        format!("{}{}{}", &self.0[..2], "*".repeat(len - 4), &self.0[len - 2..])
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Six-digit one-time code.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OtpCode(String);

impl OtpCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.len() != OTP_LEN || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::OtpFormat { expected: OTP_LEN });
        }
        Ok(Self(input.to_string()))
    }

    /// Uniform over `100000..=999999`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(100_000u32..=999_999).to_string())
    }

    /// Like [`OtpCode::random`] but never returns `previous`, so a reissued
    /// code always invalidates the one it replaces.
    pub fn random_excluding<R: Rng + ?Sized>(rng: &mut R, previous: Option<&OtpCode>) -> Self {
        loop {
            let code = Self::random(rng);
            if Some(&code) != previous {
                return code;
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}

/// Display-only reference: operator tag, last 8 digits of the epoch millis,
/// then a zero-padded 4-digit random suffix. Not an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    pub fn generate<R: Rng + ?Sized>(method: PaymentMethod, now_millis: u64, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..10_000);
        Self(format!(
            "{}{:08}{:04}",
            method.reference_prefix(),
            now_millis % 100_000_000,
            suffix
        ))
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let digits = input
            .strip_prefix("MTN")
            .or_else(|| input.strip_prefix("OM"))
            .ok_or_else(|| ValidationError::TransactionRef(input.to_string()))?;
        if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::TransactionRef(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn method(&self) -> PaymentMethod {
        if self.0.starts_with("MTN") {
            PaymentMethod::MtnMomo
        } else {
            PaymentMethod::OrangeMoney
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt shown after a confirmed payment. Built client-side and never
/// checked against the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub reference: TransactionRef,
    pub date_time: DateTime<Utc>,
    pub method: PaymentMethod,
    pub phone_number: PhoneNumber,
    pub beneficiary_name: String,
    pub amount: Gnf,
}

impl fmt::Display for TransactionReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reçu de paiement")?;
        writeln!(f, "Référence : {}", self.reference)?;
        writeln!(f, "Date : {}", self.date_time.format("%d/%m/%Y %H:%M"))?;
        writeln!(f, "Méthode : {}", self.method.label())?;
        writeln!(f, "Téléphone : {}", self.phone_number)?;
        writeln!(f, "Bénéficiaire : {}", self.beneficiary_name)?;
        write!(f, "Montant : {}", self.amount)
    }
}

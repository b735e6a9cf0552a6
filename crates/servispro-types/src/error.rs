//! Validation errors for domain values parsed from user input or the wire.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Le numéro de téléphone doit contenir au moins {min} chiffres ({actual} reçus)")]
    PhoneTooShort { min: usize, actual: usize },
    #[error("Caractère invalide dans le numéro de téléphone : {0:?}")]
    PhoneInvalidChar(char),
    #[error("Le code doit contenir exactement {expected} chiffres")]
    OtpFormat { expected: usize },
    #[error("Référence de transaction invalide : {0}")]
    TransactionRef(String),
    #[error("Moyen de paiement inconnu : {0}")]
    UnknownPaymentMethod(String),
    #[error("Le montant doit être supérieur à zéro")]
    ZeroAmount,
    #[error("Champ obligatoire manquant : {0}")]
    MissingField(&'static str),
    #[error("Identifiant {kind} invalide : {value:?}")]
    InvalidId { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing_french() {
        assert_eq!(
            ValidationError::ZeroAmount.to_string(),
            "Le montant doit être supérieur à zéro"
        );
        assert_eq!(
            ValidationError::PhoneTooShort { min: 9, actual: 5 }.to_string(),
            "Le numéro de téléphone doit contenir au moins 9 chiffres (5 reçus)"
        );
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! impl_string_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if value.trim().is_empty() || value.chars().any(|c| c.is_whitespace() || c == '/')
                {
                    return Err(ValidationError::InvalidId {
                        kind: stringify!($name),
                        value,
                    });
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

impl_string_id!(PaymentId);
impl_string_id!(JobId);
impl_string_id!(ProviderId);
impl_string_id!(CustomerId);

impl PaymentId {
    /// Fresh server-side identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl JobId {
    /// Placeholder job id used before the service request exists (`job_<millis>`).
    pub fn provisional(now_millis: u64) -> Self {
        Self(format!("job_{now_millis}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_path_like_ids() {
        assert!(PaymentId::new("").is_err());
        assert!(PaymentId::new("  ").is_err());
        assert!(PaymentId::new("a/b").is_err());
        assert!(PaymentId::new("pay 1").is_err());
        assert_eq!(PaymentId::new("pay-1").unwrap().as_str(), "pay-1");
    }

    #[test]
    fn provisional_job_id_carries_timestamp() {
        assert_eq!(JobId::provisional(1_700_000_000_123).as_str(), "job_1700000000123");
    }

    #[test]
    fn generated_payment_ids_are_distinct() {
        assert_ne!(PaymentId::generate(), PaymentId::generate());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ProviderId::new("prov-42").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"prov-42\"");
    }

    #[test]
    fn decoding_validates_ids() {
        assert!(serde_json::from_str::<ProviderId>("\"\"").is_err());
        assert!(serde_json::from_str::<JobId>("\"a/b\"").is_err());
        assert_eq!(
            serde_json::from_str::<ProviderId>("\"prov-42\"").unwrap(),
            ProviderId::new("prov-42").unwrap()
        );
    }
}

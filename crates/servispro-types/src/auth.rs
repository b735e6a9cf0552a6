//! Explicit, role-typed session state handed to components at construction.

use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, ProviderId};
use crate::payment::Gnf;

/// Name used on payments when the payer is not signed in.
pub const ANONYMOUS_PAYER_NAME: &str = "Client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Customer,
    Provider,
    Admin,
    Company,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub first_name: String,
    pub last_name: String,
    pub profession: String,
    pub investigation_fee: Option<Gnf>,
}

impl ProviderProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Fee charged before a visit; providers without one charge nothing.
    pub fn investigation_fee(&self) -> Gnf {
        self.investigation_fee.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AuthSession {
    Guest,
    Customer { profile: CustomerProfile, token: String },
    Provider { profile: ProviderProfile, token: String },
    Admin { username: String, token: String },
    Company { name: String, token: String },
}

impl AuthSession {
    pub fn role(&self) -> Role {
        match self {
            Self::Guest => Role::Guest,
            Self::Customer { .. } => Role::Customer,
            Self::Provider { .. } => Role::Provider,
            Self::Admin { .. } => Role::Admin,
            Self::Company { .. } => Role::Company,
        }
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Customer { token, .. }
            | Self::Provider { token, .. }
            | Self::Admin { token, .. }
            | Self::Company { token, .. } => Some(token),
        }
    }

    pub fn payer_name(&self) -> String {
        match self {
            Self::Customer { profile, .. } => {
                let name = format!("{} {}", profile.first_name, profile.last_name);
                let name = name.trim();
                if name.is_empty() {
                    ANONYMOUS_PAYER_NAME.to_string()
                } else {
                    name.to_string()
                }
            }
            _ => ANONYMOUS_PAYER_NAME.to_string(),
        }
    }

    /// Phone pre-filled in the payment form.
    pub fn payer_phone(&self) -> Option<&str> {
        match self {
            Self::Customer { profile, .. } => profile.phone_number.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(first: &str, last: &str) -> AuthSession {
        AuthSession::Customer {
            profile: CustomerProfile {
                id: CustomerId::new("cust-1").unwrap(),
                first_name: first.to_string(),
                last_name: last.to_string(),
                phone_number: Some("620000000".to_string()),
            },
            token: "tok".to_string(),
        }
    }

    #[test]
    fn customer_supplies_payer_details() {
        let session = customer("Aissatou", "Bah");
        assert_eq!(session.role(), Role::Customer);
        assert_eq!(session.payer_name(), "Aissatou Bah");
        assert_eq!(session.payer_phone(), Some("620000000"));
        assert_eq!(session.bearer_token(), Some("tok"));
    }

    #[test]
    fn guest_and_blank_names_fall_back_to_client() {
        assert_eq!(AuthSession::Guest.payer_name(), ANONYMOUS_PAYER_NAME);
        assert_eq!(AuthSession::Guest.bearer_token(), None);
        assert_eq!(customer("", "").payer_name(), ANONYMOUS_PAYER_NAME);
    }

    #[test]
    fn session_serializes_with_role_tag() {
        let json = serde_json::to_value(AuthSession::Admin {
            username: "root".to_string(),
            token: "t".to_string(),
        })
        .unwrap();
        assert_eq!(json["role"], "admin");
    }
}

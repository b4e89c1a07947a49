//! Address rules a realm applies to invitees and registrants

use crate::domain::{email_domain, Realm};
use validator::ValidateEmail;

/// Why an address may not join a realm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRejection {
    InvalidSyntax,
    OutsideDomain,
    ContainsPlus,
    Disposable,
}

impl AddressRejection {
    /// Per-address reason reported back to an inviter
    pub fn invite_reason(&self) -> &'static str {
        match self {
            Self::InvalidSyntax => "Invalid address.",
            Self::OutsideDomain => "Outside your domain.",
            Self::ContainsPlus => "Email addresses containing + are not allowed.",
            Self::Disposable => "Please use your real email address.",
        }
    }

    /// Message shown on the registration form
    pub fn signup_message(&self, realm_name: &str) -> String {
        match self {
            Self::InvalidSyntax => {
                "The email address you are trying to sign up with is not valid".to_string()
            }
            Self::OutsideDomain => format!(
                "{} only allows users with email addresses within the organization.",
                realm_name
            ),
            Self::ContainsPlus => format!(
                "{}, does not allow signups using emails that contains +",
                realm_name
            ),
            Self::Disposable => "Please sign up using a real email address.".to_string(),
        }
    }
}

/// Apply syntax, domain-restriction and disposable-domain rules.
pub fn check_address_for_realm(
    realm: &Realm,
    address: &str,
    disposable_domains: &[String],
) -> Result<(), AddressRejection> {
    if !address.validate_email() {
        return Err(AddressRejection::InvalidSyntax);
    }
    let domain = email_domain(address)
        .ok_or(AddressRejection::InvalidSyntax)?
        .to_lowercase();

    if realm.emails_restricted_to_domains {
        if !realm.allows_domain(&domain) {
            return Err(AddressRejection::OutsideDomain);
        }
        if address.contains('+') {
            return Err(AddressRejection::ContainsPlus);
        }
    }

    if realm.disallow_disposable_email_addresses
        && disposable_domains.iter().any(|d| d.eq_ignore_ascii_case(&domain))
    {
        return Err(AddressRejection::Disposable);
    }

    Ok(())
}

use std::fmt;

use validator::ValidateEmail;

/// Longest address accepted, per the SMTP path limit
const MAX_EMAIL_LEN: usize = 254;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse email address
    pub fn parse(email: String) -> Result<Self, String> {
        let has_dotted_domain = email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.contains('.'));

        if email.len() <= MAX_EMAIL_LEN
            && has_dotted_domain
            && ValidateEmail::validate_email(&email)
        {
            Ok(Self(email))
        } else {
            Err("email is not a valid email address".into())
        }
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

use crate::domain::{EmailAddress, MessageBody, SubmitterName};

/// A validated contact form submission
///
/// Built once per request and never mutated afterwards. The store and the
/// notifier each receive their own copy.
#[derive(Debug, Clone)]
pub struct Submission {
    pub name: SubmitterName,
    pub email: EmailAddress,
    pub message: MessageBody,
}

impl Submission {
    /// Validate raw field values, checking name, email and message in that order
    pub fn parse(name: String, email: String, message: String) -> Result<Self, String> {
        let name = SubmitterName::parse(name)?;
        let email = EmailAddress::parse(email)?;
        let message = MessageBody::parse(message)?;
        Ok(Self {
            name,
            email,
            message,
        })
    }
}

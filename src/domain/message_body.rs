/// Upper bound on the stored and mailed message, in bytes
pub const MAX_MESSAGE_BYTES: usize = 10_000;

/// Free-form text of a contact message
#[derive(Debug, Clone)]
pub struct MessageBody(String);

impl MessageBody {
    /// Parse message body
    pub fn parse(message: String) -> Result<Self, String> {
        if message.trim().is_empty() {
            Err("message must not be empty".into())
        } else if message.len() > MAX_MESSAGE_BYTES {
            Err(format!("message must be at most {MAX_MESSAGE_BYTES} bytes"))
        } else {
            Ok(Self(message))
        }
    }
}

impl AsRef<str> for MessageBody {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Longest name accepted, in characters
const MAX_NAME_LEN: usize = 256;

/// Name of the visitor who filled in the contact form
#[derive(Debug, Clone)]
pub struct SubmitterName(String);

impl SubmitterName {
    /// Parse submitter name
    pub fn parse(name: String) -> Result<Self, String> {
        if name.trim().is_empty() {
            Err("name must not be empty".into())
        } else if name.chars().count() > MAX_NAME_LEN {
            Err(format!("name must be at most {MAX_NAME_LEN} characters"))
        } else {
            Ok(Self(name))
        }
    }
}

impl AsRef<str> for SubmitterName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

mod email_address;
mod message_body;
mod submission;
mod submitter_name;

pub use email_address::EmailAddress;
pub use message_body::MessageBody;
pub use submission::Submission;
pub use submitter_name::SubmitterName;

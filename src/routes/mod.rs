mod health_check;
mod submit;

pub use health_check::*;
pub use submit::*;

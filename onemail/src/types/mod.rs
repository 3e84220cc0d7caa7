pub mod auth;
pub mod email;
pub mod error;

pub use auth::{Tokens, User};
pub use email::{EmailMessage, RealtimeMessage, SyncStatus};
pub use error::{OneMailError, Result};

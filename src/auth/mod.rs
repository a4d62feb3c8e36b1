//! Credential verification
//!
//! Sessions are HMAC-signed tokens issued elsewhere; this module only
//! verifies them and exposes the caller's identity to handlers.

mod middleware;
pub mod session;

pub use middleware::{CurrentUser, require_auth};
pub use session::{Session, create_session_token, verify_session_token};

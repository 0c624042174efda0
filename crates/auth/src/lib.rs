//! # Breakwise Auth
//!
//! Session values and backend seams shared by the extension's background
//! context and the organization-side invitation flow, plus the temporary
//! credential generator used when an invitation provisions an account.

pub mod backend;
pub mod memory;
pub mod password;
pub mod session;

pub use backend::{AccountProvisioner, AuthBackend, AuthError, BackendError};
pub use memory::InMemoryAuthBackend;
pub use password::{GeneratedPassword, PasswordError, PasswordProvisioner};
pub use session::{AuthChange, AuthEvent, Session, SessionUser, SharedSession, UserId};

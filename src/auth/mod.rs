/// Authentication module
///
/// Handles JWT token signing/verification, password hashing,
/// and the credential lifecycle built on top of them.

mod claims;
mod jwt;
mod password;
mod service;

pub use claims::{Claims, TokenType};
pub use jwt::TokenCodec;
pub use password::PasswordHasher;
pub use service::{AccountInfo, AuthService, AuthSession, TokenPair, TOKEN_TYPE};

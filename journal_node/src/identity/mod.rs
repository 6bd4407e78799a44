//! Account credentials and bearer tokens

pub mod password;
pub mod session;

pub use password::{hash_password, verify_password};
pub use session::{parse_bearer_token, Claims, IssuedToken, JwtKeys};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a bearer token")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;

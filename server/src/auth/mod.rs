//! Account authentication: bcrypt password hashes and HS256 bearer tokens.

mod extractor;
mod jwt;
mod password;

use thiserror::Error;

pub use extractor::AuthUser;
pub use jwt::{Claims, JwtManager, TOKEN_ISSUER};
pub use password::{hash_password, verify_password};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingToken,

    #[error("invalid authorization format, expected 'Bearer <token>'")]
    MalformedHeader,

    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    InvalidToken,

    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

//! Caller identity: validation of bearer access tokens issued by the
//! identity service.

pub mod claims;
pub mod jwt;

pub use claims::{Claims, TokenType};
pub use jwt::JwtManager;

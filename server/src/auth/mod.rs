//! Authentication for the marketplace API
//!
//! - Wallet users sign in with a Pi access token verified server-side
//! - The admin console signs in with a bcrypt-checked password
//! - Both receive an HS256 access token

mod jwt;

pub use jwt::{generate_access_token, verify_token, Claims, TokenKeys, TokenRole};

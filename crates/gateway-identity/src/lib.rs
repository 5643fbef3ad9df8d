//! # gateway-identity
//!
//! Identity & Token Service: RS256-primary/HS256-legacy
//! JWT verification, JWKS publication and rotation, local login, and the
//! OAuth-callback upsert surface.

pub mod claims;
pub mod error;
pub mod keys;
pub mod login;
pub mod resolve;
pub mod secretbox;
pub mod token;

pub use claims::AccessClaims;
pub use error::IdentityError;
pub use keys::Keyring;
pub use login::{local_login, oauth_upsert};
pub use resolve::{extract_credential, resolve, Resolution, Resolved};
pub use token::{TokenService, VerifiedToken, VerifiedVia};

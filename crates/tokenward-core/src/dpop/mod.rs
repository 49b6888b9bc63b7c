//! DPoP (Demonstrating Proof of Possession, RFC 9449)
//!
//! - `proof` - per-issuer proof validation
//! - `replay` - process-wide jti replay protection

pub mod proof;
pub mod replay;

pub use proof::{access_token_hash, DpopValidator, DPOP_HEADER, DPOP_JWT_TYPE};
pub use replay::ReplayProtection;

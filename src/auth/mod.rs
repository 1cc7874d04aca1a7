//! Access token issuance and the request authorization gate.

mod extractor;
pub mod token;

pub use extractor::BearerAuth;
pub use token::{create_access_token, verify_access_token};

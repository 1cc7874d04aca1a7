//! Business logic services.

pub mod cleanup;
pub mod password;
pub mod session;

pub use cleanup::{CleanupConfig, start_cleanup_task};
pub use session::SessionService;

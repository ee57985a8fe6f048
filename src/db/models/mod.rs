//! Database models split into domain-specific modules.

pub mod comment;
pub mod study_session;
pub mod user;

pub use comment::*;
pub use study_session::*;
pub use user::*;

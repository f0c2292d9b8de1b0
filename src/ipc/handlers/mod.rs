pub mod analytics;
pub mod backup;
pub mod comments;
pub mod core;
pub mod session;
pub mod setup;
pub mod students;

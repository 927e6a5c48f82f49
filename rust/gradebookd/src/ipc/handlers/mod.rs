pub mod analytics;
pub mod attendance;
pub mod backup;
pub mod core;
pub mod marksheets;
pub mod schemes;
pub mod schools;
pub mod seed;
pub mod setup;
pub mod students;

pub mod auth;
pub mod dashboard;
pub mod goals;
pub mod resources;
pub mod tasks;

pub mod auth;
pub mod ownership;

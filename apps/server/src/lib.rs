pub mod auth;
pub mod cloud;
pub mod env;
pub mod routes;

pub use routes::{AppState, router};

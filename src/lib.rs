pub mod auth;
pub mod client;
pub mod config;

pub use self::client::{Error, HttpClient};

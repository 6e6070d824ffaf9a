pub mod error;
pub mod config;
pub mod account;
pub mod session;
pub mod context;
pub mod provider;
pub mod answer;
pub mod service;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

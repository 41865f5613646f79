pub mod bot;
pub mod service;

pub use bot::{Bridge, BridgeSettings, GoogleLink};

pub mod oauth;
pub mod sheets;

pub use oauth::GoogleAuth;

pub mod google;
pub mod http;
pub mod portal;
pub mod store;

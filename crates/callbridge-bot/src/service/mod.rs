pub mod dates;
pub mod locks;
pub mod queue;
pub mod report;
pub mod session;
pub mod stats;
pub mod store;
pub mod sync;

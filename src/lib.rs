pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod mapping;
pub mod messages;
pub mod seat;
pub mod shutdown;
pub mod vehicle;

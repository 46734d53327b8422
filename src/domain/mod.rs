pub mod actor;
pub mod booking;
pub mod dispute;
pub mod money;
pub mod offer;
pub mod payment;
pub mod ports;
pub mod require;

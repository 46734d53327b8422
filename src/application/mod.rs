pub mod dispute;
pub mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod negotiation;
pub mod sweep;

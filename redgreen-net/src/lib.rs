pub mod client;
pub mod error;
pub mod watchdog;
pub mod wire;
pub mod worker;

pub use client::{Backend, ClientConfig, HttpBackend};
pub use error::NetError;
pub use watchdog::TimeoutWatchdog;
pub use wire::{KeyNames, TimeoutStatus};
pub use worker::{NetJob, NetReply, NetWorker};

//! Verification harness for an AXI4 slave fronting a processing-in-memory
//! device: burst master, stall injection, channel drivers, scoreboard and a
//! memory-backed device model, all driven by a small cycle-based kernel.

pub mod axi;
pub mod burst;
pub mod channel;
pub mod config;
pub mod error;
mod executor;
pub mod master;
pub mod prelude;
pub mod ram;
pub mod regression;
mod signal;
pub mod sim;
pub mod stall;
pub mod tb;
mod tb_obj;
pub mod testbench;
mod trigger;
pub mod utils;

pub use error::{Mismatch, ProtocolError, TbError, TbResult};
pub use executor::JoinHandle;
pub use signal::Signal;
pub use tb_obj::TbObj;
pub use trigger::RisingEdge;

//! Shared data model for the PISA chain-following response pipeline.
//!
//! This crate is deliberately thin: it holds the block, transaction, log,
//! transaction-identifier and appointment shapes every other `pisa-*` crate
//! needs, and nothing about how blocks are fetched, cached or acted upon.

pub mod appointment;
pub mod block;
pub mod log;
pub mod transaction;

pub use appointment::Appointment;
pub use block::{Block, BlockHeader, BlockHeaderLike};
pub use log::Log;
pub use transaction::{PisaTransactionIdentifier, Transaction};

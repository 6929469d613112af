#![doc = include_str!("../README.md")]

mod digest;
mod error;
mod ledger;
mod service;
mod shutdown;
mod stats;
mod worker;

pub use crate::digest::*;
pub use crate::error::*;
pub use crate::ledger::*;
pub use crate::service::*;
pub use crate::shutdown::*;
pub use crate::stats::*;
pub use crate::worker::*;

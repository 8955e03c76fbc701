//! Frontend Module
//!
//! The caller-facing facades: a buffered single-store frontend and a
//! multi-store frontend with pluggable placement.

mod buffer;
mod dispatch;
mod fanout;
mod multi;
mod shove;

pub use dispatch::{CopyDispatcher, Dispatcher, RoundRobinDispatcher};
pub use fanout::FanOut;
pub use multi::MultiShove;
pub use shove::Shove;

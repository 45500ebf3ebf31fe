pub mod core;
pub mod types;

pub use core::Ledger;
pub use types::*;

pub mod lifecycle;
pub mod resolver;
pub mod types;

pub use lifecycle::BetEngine;
pub use types::*;

pub mod fair;
pub mod instant;
pub mod rules;
pub mod types;

pub use fair::FairnessEngine;
pub use instant::GameEngine;
pub use types::*;

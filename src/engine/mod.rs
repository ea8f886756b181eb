pub mod assessment;
pub mod banks;
pub mod classifier;
pub mod curriculum;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod facts;
pub mod persistence;
pub mod placement;
pub mod session;
pub mod types;

pub use engine::FluencyEngine;
pub use types::{Band, Fact, Operation, Trend};

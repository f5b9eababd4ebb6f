pub mod snapshot;
pub mod strike;
pub mod probability;
pub mod evaluator;
pub mod paper;
pub mod orchestrator;

pub use snapshot::*;
pub use strike::*;
pub use paper::*;
pub use orchestrator::*;

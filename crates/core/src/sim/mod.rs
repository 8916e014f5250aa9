pub mod projection;
pub mod runner;

pub use projection::{project, Projection, ScopePricing, SimulationParams};
pub use runner::SimulationRunner;

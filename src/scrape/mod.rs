pub mod aggregate;
pub mod coordinator;
pub mod normalize;

pub use coordinator::{RunCoordinator, RunSettings};

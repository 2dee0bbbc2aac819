pub mod incident;
pub mod triage;

pub use incident::*;
pub use triage::*;

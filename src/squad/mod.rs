//! Squad lifecycle and the waiting pool view.

mod pool;
mod registry;

pub use pool::{WaitingPool, WaitingPoolEntry};
pub use registry::{Admission, SquadMatch, SquadRegistry};

//! Group formation over a guild's waiting pool.

mod greedy;
mod lease;

pub use greedy::{CompatibilityGroup, GroupFormation};
pub use lease::FormationLease;

//! Matching façade and the background pool scanner.

mod facade;
mod scanner;

pub use facade::{JoinOutcome, MatchingService, PoolMatchReport};
pub use scanner::{PoolScanner, ScanSummary};

//! Terminal display helpers for the CLI.

pub mod tables;
pub mod theme;

pub use tables::{TableBuilder, match_table, pool_table, report_table, squad_table};
pub use theme::{THEME, Theme};

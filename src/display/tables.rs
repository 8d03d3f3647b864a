//! Tables for squads, matches and the waiting pool.

use crate::matching::PoolMatchReport;
use crate::squad::{SquadMatch, WaitingPoolEntry};
use crate::types::{Squad, SquadStatus};
use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            table: styled_table(),
        }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        self.table.set_header(header_cells(&headers));
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn header_cells(headers: &[&str]) -> Vec<Cell> {
    headers
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

// comfy-table measures ANSI escapes as width, so color goes through Cell::fg
fn status_cell(status: SquadStatus) -> Cell {
    let color = match status {
        SquadStatus::Forming => Color::Yellow,
        SquadStatus::Active => Color::Green,
        SquadStatus::Completed => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn squad_table(squads: &[Squad], max_size: usize) -> String {
    let mut table = styled_table();
    table.set_header(header_cells(&[
        "Squad", "Name", "Status", "Members", "Free", "Avg skill", "Version",
    ]));
    for squad in squads {
        table.add_row(vec![
            Cell::new(squad.id.value()),
            Cell::new(&squad.name),
            status_cell(squad.status),
            Cell::new(squad.member_count),
            Cell::new(squad.available_slots(max_size)),
            Cell::new(format!("{:.1}", squad.average_skill_level)),
            Cell::new(squad.version),
        ]);
    }
    table.to_string()
}

pub fn match_table(matches: &[SquadMatch]) -> String {
    let mut table = styled_table();
    table.set_header(header_cells(&[
        "Rank", "Squad", "Name", "Status", "Members", "Free", "Avg similarity",
    ]));
    for (rank, m) in matches.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(m.squad_id.value()),
            Cell::new(&m.squad_name),
            status_cell(m.status),
            Cell::new(m.member_count),
            Cell::new(m.available_slots),
            Cell::new(format!("{:.3}", m.average_similarity)),
        ]);
    }
    table.to_string()
}

pub fn pool_table(entries: &[WaitingPoolEntry]) -> String {
    let mut table = styled_table();
    table.set_header(header_cells(&[
        "User", "Joined", "Skill", "Velocity", "UTC offset", "Language",
    ]));
    for entry in entries {
        let joined = entry.joined_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let row = match &entry.profile {
            Some(p) => vec![
                Cell::new(entry.user_id.value()),
                Cell::new(joined),
                Cell::new(p.skill_level),
                Cell::new(format!("{:.2}", p.learning_velocity)),
                Cell::new(format!("{:+.1}", p.timezone_offset)),
                Cell::new(&p.language),
            ],
            None => vec![
                Cell::new(entry.user_id.value()),
                Cell::new(joined),
                Cell::new("no profile").fg(Color::Yellow),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
            ],
        };
        table.add_row(row);
    }
    table.to_string()
}

/// One row per formed squad, plus a total.
pub fn report_table(report: &PoolMatchReport) -> String {
    let mut table = styled_table();
    table.set_header(header_cells(&["Squad", "Name", "Members", "Avg similarity"]));
    for (squad, group) in report.formed_squads.iter().zip(&report.compatible_groups) {
        table.add_row(vec![
            Cell::new(squad.id.value()),
            Cell::new(&squad.name),
            Cell::new(group.len()),
            Cell::new(format!("{:.3}", group.average_similarity)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(report.notified_user_ids.len()).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
    table.to_string()
}

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::providers::BuildStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_color(status: BuildStatus) -> TableColor {
    match status {
        BuildStatus::Passed => TableColor::Green,
        BuildStatus::Failed => TableColor::Red,
        BuildStatus::Building => TableColor::Yellow,
        BuildStatus::Cancelled | BuildStatus::Unknown => TableColor::DarkGrey,
    }
}

/// Count cell coloured like the status it counts; zero counts are dimmed.
pub fn status_count_cell(count: usize, status: BuildStatus) -> Cell {
    if count == 0 {
        Cell::new(count).fg(TableColor::DarkGrey)
    } else {
        Cell::new(count).fg(status_color(status))
    }
}

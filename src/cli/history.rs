use super::ui;
use crate::core::engine::FundStore;
use crate::core::fund::{HistoryPoint, HistoryRange};
use anyhow::Result;
use comfy_table::{Cell, Table};

/// Newest day first, the way a statement reads.
pub fn history_table(points: &[HistoryPoint]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Net Value"),
        ui::header_cell("Change"),
    ]);
    for point in points.iter().rev() {
        table.add_row(vec![
            Cell::new(point.date.format("%Y-%m-%d")),
            ui::value_cell(point.value),
            ui::change_cell(point.change),
        ]);
    }
    table
}

/// Change between the first and last point of the window, in percent.
pub fn period_change(points: &[HistoryPoint]) -> Option<f64> {
    let first = points.first()?;
    let last = points.last()?;
    if points.len() < 2 || first.value == 0.0 {
        return None;
    }
    Some((last.value - first.value) / first.value * 100.0)
}

pub async fn run(store: &FundStore, code: &str, range: HistoryRange) -> Result<()> {
    let pb = ui::new_spinner("Fetching history...");
    let points = store.fetch_history(code, range).await;
    pb.finish_and_clear();
    let points = points?;

    println!(
        "{} {}",
        ui::style_text(code.trim(), ui::StyleType::Title),
        ui::style_text(&format!("last {range}"), ui::StyleType::Subtle)
    );
    println!("{}", history_table(&points));
    if let Some(change) = period_change(&points) {
        let style_type = if change >= 0.0 {
            ui::StyleType::Rising
        } else {
            ui::StyleType::Falling
        };
        println!(
            "{} {}",
            ui::style_text("Period change:", ui::StyleType::Label),
            ui::style_text(&format!("{change:+.2}%"), style_type)
        );
    }
    Ok(())
}

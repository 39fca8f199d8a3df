use super::ui;
use crate::core::engine::FundStore;
use crate::core::fund::SearchResult;
use anyhow::Result;
use comfy_table::{Cell, Color, Table};

/// Caps the printed rows; the index matches thousands of funds for short
/// keywords.
pub const MAX_RESULTS: usize = 20;

pub fn results_table(results: &[SearchResult], watched: impl Fn(&str) -> bool) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell(""),
    ]);
    for result in results.iter().take(MAX_RESULTS) {
        let marker = if watched(&result.code) {
            Cell::new("watching").fg(Color::DarkGrey)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(&result.code),
            Cell::new(&result.name),
            Cell::new(&result.kind),
            marker,
        ]);
    }
    table
}

pub async fn run(store: &FundStore, keyword: &str) -> Result<()> {
    let pb = ui::new_spinner("Searching...");
    let results = store.search_funds(keyword).await;
    pb.finish_and_clear();

    if let Some(error) = store.snapshot().error {
        anyhow::bail!(error);
    }
    if results.is_empty() {
        println!("No funds match {}", ui::style_text(keyword, ui::StyleType::Label));
        return Ok(());
    }

    let state = store.snapshot();
    println!("{}", results_table(&results, |code| state.contains(code)));
    if results.len() > MAX_RESULTS {
        println!(
            "{}",
            ui::style_text(
                &format!("Showing {MAX_RESULTS} of {} matches", results.len()),
                ui::StyleType::Subtle
            )
        );
    }
    Ok(())
}

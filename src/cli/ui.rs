use crate::core::engine::EngineState;
use crate::core::fund::FundRecord;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Label,
    Rising,
    Falling,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Label => style(text).bold(),
        StyleType::Rising => style(text).green().bold(),
        StyleType::Falling => style(text).red().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

pub fn value_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.4}")).set_alignment(CellAlignment::Right)
}

/// Signed percentage, green when rising and red when falling.
pub fn change_cell(change: f64) -> Cell {
    let text = format!("{change:+.2}%");
    let color = if change >= 0.0 {
        Color::Green
    } else {
        Color::Red
    };
    Cell::new(text).fg(color).set_alignment(CellAlignment::Right)
}

/// Renders the watch-list in display order.
pub fn fund_table(funds: &[FundRecord]) -> Table {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Code"),
        header_cell("Name"),
        header_cell("Net Value"),
        header_cell("Estimate"),
        header_cell("Change"),
        header_cell("Updated"),
    ]);

    for fund in funds {
        table.add_row(vec![
            Cell::new(&fund.code),
            Cell::new(&fund.name),
            format_optional_cell(fund.net_value, |v| format!("{v:.4}")),
            value_cell(fund.estimate_value),
            change_cell(fund.estimate_change),
            Cell::new(&fund.last_update).fg(Color::DarkGrey),
        ]);
    }
    table
}

pub fn format_interval(interval_ms: u64) -> String {
    if interval_ms % 60_000 == 0 {
        format!("{}m", interval_ms / 60_000)
    } else if interval_ms % 1000 == 0 {
        format!("{}s", interval_ms / 1000)
    } else {
        format!("{interval_ms}ms")
    }
}

/// One-line summary of refresh status, settings and the last error.
pub fn status_line(state: &EngineState) -> String {
    let updated = state
        .last_update
        .map_or("never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    let auto = if state.auto_refresh_enabled {
        format!("every {}", format_interval(state.refresh_interval_ms))
    } else {
        "off".to_string()
    };

    let mut line = format!(
        "{} {}  {} {}",
        style_text("Last update:", StyleType::Label),
        updated,
        style_text("Auto refresh:", StyleType::Label),
        auto
    );
    if state.is_refreshing {
        line.push_str(&format!("  {}", style_text("refreshing...", StyleType::Subtle)));
    }
    if let Some(error) = &state.error {
        line.push_str(&format!("\n{}", style_text(error, StyleType::Error)));
    }
    line
}

/// Watch-list table followed by the status line.
pub fn render_state(state: &EngineState) -> String {
    if state.watch_list.is_empty() {
        return format!(
            "{}\n\n{}",
            style_text(
                "Watch-list is empty. Add a fund with `fundwatch add <code>`.",
                StyleType::Subtle
            ),
            status_line(state)
        );
    }

    let rising = state.watch_list.iter().filter(|f| f.is_rising).count();
    let falling = state.watch_list.len() - rising;
    format!(
        "{}\n{}\n\n{} {}  {} {}",
        fund_table(&state.watch_list),
        status_line(state),
        style_text("Rising:", StyleType::Label),
        style_text(&rising.to_string(), StyleType::Rising),
        style_text("Falling:", StyleType::Label),
        style_text(&falling.to_string(), StyleType::Falling),
    )
}

/// Spinner shown while waiting on the network.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

use super::ui;
use crate::core::config::REFRESH_INTERVAL_PRESETS_MS;
use crate::core::engine::{FundStore, RefreshOutcome};
use anyhow::Result;
use tracing::debug;

/// Refreshes the watch-list and prints it.
///
/// The table is printed even when every fetch failed, so stale values stay
/// visible next to the error.
pub async fn list(store: &FundStore, force_refresh: bool) -> Result<()> {
    let pb = ui::new_spinner("Refreshing valuations...");
    let outcome = store.refresh_funds(force_refresh).await;
    pb.finish_and_clear();

    match &outcome {
        Ok(RefreshOutcome::Fetched { failed, .. }) if !failed.is_empty() => {
            println!(
                "{}",
                ui::style_text(
                    &format!("Could not refresh: {}", failed.join(", ")),
                    ui::StyleType::Error
                )
            );
        }
        Ok(other) => debug!(?other, "Refresh finished"),
        Err(_) => {}
    }

    println!("{}", ui::render_state(&store.snapshot()));
    outcome.map(|_| ()).map_err(Into::into)
}

/// Adds each code in order; the remaining codes are still tried after a
/// failure.
pub async fn add(store: &FundStore, codes: &[String]) -> Result<()> {
    let mut failures = 0;
    for code in codes {
        match store.add_fund(code).await {
            Ok(record) => println!(
                "Added {} {}",
                ui::style_text(&record.code, ui::StyleType::Label),
                record.name
            ),
            Err(e) => {
                failures += 1;
                println!("{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("Failed to add {failures} of {} fund(s)", codes.len());
    }
    store.clear_error();
    Ok(())
}

pub fn remove(store: &FundStore, codes: &[String]) -> Result<()> {
    for code in codes {
        let known = store.snapshot().contains(code.trim());
        store.remove_fund(code);
        if known {
            println!("Removed {}", ui::style_text(code.trim(), ui::StyleType::Label));
        } else {
            println!(
                "{}",
                ui::style_text(
                    &format!("{} is not in the watch-list", code.trim()),
                    ui::StyleType::Subtle
                )
            );
        }
    }
    Ok(())
}

/// Updates auto-refresh settings, then prints the effective values.
pub fn auto(store: &FundStore, enabled: Option<bool>, interval_ms: Option<u64>) -> Result<()> {
    if let Some(interval_ms) = interval_ms {
        store.set_refresh_interval(interval_ms)?;
    }
    if let Some(enabled) = enabled {
        store.set_auto_refresh(enabled);
    }

    let state = store.snapshot();
    let presets = REFRESH_INTERVAL_PRESETS_MS
        .iter()
        .map(|ms| ui::format_interval(*ms))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "{} {}",
        ui::style_text("Auto refresh:", ui::StyleType::Label),
        if state.auto_refresh_enabled { "on" } else { "off" }
    );
    println!(
        "{} {} {}",
        ui::style_text("Interval:", ui::StyleType::Label),
        ui::format_interval(state.refresh_interval_ms),
        ui::style_text(&format!("(presets: {presets})"), ui::StyleType::Subtle)
    );
    Ok(())
}

use super::ui;
use crate::core::engine::{EngineState, FundStore};
use crate::core::scheduler::{AutoRefresh, Debouncer};
use crate::store::StateStore;
use anyhow::Result;
use console::Term;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quiet period before a burst of state changes is redrawn.
pub const RENDER_DEBOUNCE: Duration = Duration::from_millis(300);

fn draw(state: &EngineState) {
    let term = Term::stdout();
    if let Err(e) = term.clear_screen() {
        debug!(error = %e, "Could not clear the screen");
    }
    println!(
        "{}\n",
        ui::style_text("Fund valuations", ui::StyleType::Title)
    );
    println!("{}", ui::render_state(state));
    println!(
        "\n{}",
        ui::style_text("Press Ctrl-C to exit", ui::StyleType::Subtle)
    );
}

/// Live view of the watch-list until Ctrl-C.
pub async fn run(store: Arc<FundStore>, state_store: Arc<dyn StateStore>) -> Result<()> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
        }
    };
    run_until(store, state_store, ctrl_c).await
}

/// Live view of the watch-list until `shutdown` completes.
///
/// Refreshes follow the stored auto-refresh settings. State is saved on exit,
/// including when `shutdown` fires during the initial refresh.
pub async fn run_until<F>(
    store: Arc<FundStore>,
    state_store: Arc<dyn StateStore>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut states = store.subscribe();
    let debouncer = Debouncer::new();

    let stopped_early = tokio::select! {
        biased;
        () = &mut shutdown => true,
        refreshed = store.refresh_funds(true) => {
            if let Err(e) = refreshed {
                warn!(error = %e, "Initial refresh failed");
            }
            false
        }
    };

    if !stopped_early {
        draw(&states.borrow_and_update());
        let auto = AutoRefresh::spawn(Arc::clone(&store));
        info!("Watching funds");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let store = Arc::clone(&store);
                    debouncer.arm(RENDER_DEBOUNCE, async move {
                        draw(&store.snapshot());
                    });
                }
            }
        }
        auto.stop();
    }

    debug!("Stopping watch");
    debouncer.cancel();
    state_store.save(&store.persisted()).await
}

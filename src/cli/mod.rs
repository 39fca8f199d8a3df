//! Terminal commands

pub mod funds;
pub mod history;
pub mod search;
pub mod setup;
pub mod ui;
pub mod watch;

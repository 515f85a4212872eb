pub mod filter;
mod state;
pub mod tree;

pub use state::{App, InputMode, PaneContent};
pub(crate) use state::{chrono_now, truncate};

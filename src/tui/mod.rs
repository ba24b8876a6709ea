//! Terminal User Interface module
//!
//! Chat history, the decision surface for pending tool calls and the
//! edit-and-approve form, all driven by `ViewState` snapshots from the session.

mod app;
mod keys;
mod theme;
mod widgets;

pub use app::App;
pub use keys::{map_key, KeyAction, Mode};
pub use theme::Theme;

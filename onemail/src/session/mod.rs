//! Signed-in session state
//!
//! `SessionController` follows sign-in and sign-out and drives the realtime
//! channel; `Dashboard` holds what the channel has delivered so far.

mod controller;
mod dashboard;

pub use controller::SessionController;
pub use dashboard::{Dashboard, DashboardHandlers, DashboardState};

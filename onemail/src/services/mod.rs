//! Business logic on top of the API client
//!
//! - `auth_service`: account, session and Gmail link routes
//! - `events`: notices and login prompts for the dashboard shell
//! - `helpers`: token and input checks that need no server

pub mod auth_service;
pub mod events;
pub mod helpers;

pub use auth_service::AuthService;
pub use events::{EventEmitter, Notice, NoticeLevel, SessionEvent};

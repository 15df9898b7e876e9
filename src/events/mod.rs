//! Security events.
//!
//! Controllers and their components dispatch [`SecurityEvent`]s to an
//! [`EventRegistry`]. If no listeners are registered, events are dropped.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warden::events::listeners::LoggingListener;
//! use warden::{SecurityConfig, SecurityController};
//!
//! let controller = SecurityController::builder(SecurityConfig::default())
//!     .listener(LoggingListener::new())
//!     .build()?;
//! ```

mod event;
mod listener;
mod registry;

pub mod listeners;

pub use event::{LogoutReason, SecurityEvent};
pub use listener::Listener;
pub use registry::EventRegistry;

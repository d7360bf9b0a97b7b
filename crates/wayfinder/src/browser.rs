//! Everything that touches the live browser.
//!
//! [`AutomationEngine`] is the narrow outbound interface to a real browser. [`BrowserSession`]
//! owns the engine, serializes actions on it and turns typed tool calls into results.
mod engine;
mod session;
mod surface;

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(test)]
pub mod mock;

pub use engine::{AriaSelector, AutomationEngine, AxNode, ElementId, PageId};
pub use session::BrowserSession;
pub use surface::{flatten, INTERACTIBLE_ROLES};

//! Client-side orchestration for preparing an installed Steam title for offline play.
//!
//! The pieces: [`search::SearchResolver`] turns typed text into a catalog id,
//! [`probe::ProtectionProbe`] checks the id for anti-tamper protection,
//! [`progress::ProgressBridge`] mirrors the backend's progress topic, and
//! [`workflow::CrackWorkflow`] runs the apply-task one at a time.
//! [`app::CrackManager`] wires them together for a front-end.

pub mod api;
pub mod app;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod game_path;
pub mod notify;
pub mod patcher;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod search;
pub mod timer;
pub mod workflow;

pub use api::{CatalogEntry, CatalogId};
pub use app::{CrackManager, Timings};
pub use backend::{Backend, DesktopBackend, DrmNoticeLookup};
pub use error::{Error, Result};
pub use events::{EventHub, PROGRESS_TOPIC};
pub use progress::ProgressSnapshot;

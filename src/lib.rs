//! SkypyDB Monitor — live dashboard state for a SkypyDB API server.
//!
//! A [`poller::Poller`] probes the backend, fetches the summary and health
//! payloads, and publishes the reconciled [`poller::PollerState`] to
//! subscribers. [`view`] turns that state into the dashboard and health
//! pages.

pub mod api;
pub mod config;
pub mod error;
pub mod poller;
pub mod view;

pub use api::{DashboardApi, HttpDashboardApi};
pub use error::{ApiError, ErrorClass};
pub use poller::{Poller, PollerOptions, PollerState};

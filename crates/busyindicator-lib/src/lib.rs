//! BusyIndicator — mirror Microsoft Teams / Graph presence on an RGB LED strip.

pub mod auth;
pub mod backoff;
pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod led;
pub mod mapper;
pub mod poll;
pub mod presence;
pub mod source;

pub use error::BusyIndicatorError;

//! Sentinel Core Library
//!
//! Configuration, lifecycle, the detection loop and event dispatch.

pub mod colored_logger;
pub mod config;
pub mod daemon;
pub mod detector;
pub mod dispatcher;
pub mod lifecycle;
pub mod snapshot;

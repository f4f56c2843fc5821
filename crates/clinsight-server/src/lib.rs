//! HTTP layer of the Clinsight prediction service: configuration, shared
//! application state and the warp route tree.

pub mod api;
pub mod config;
pub mod context;

//! Tag retention and garbage-collection trigger for a distribution registry.
//!
//! Delete notifications from the registry are coalesced into one delayed
//! `garbage-collect`, and a periodic pass keeps the newest N tags of every
//! repository before collecting.

pub mod api;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod reclaim;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod service;
pub mod utils;

// Job Track - Website Change Tracker Core
//
// This crate provides the change-detection and deep-scrape pipeline:
// a daily probe scheduler, a broker-mediated hand-off to a browser-driven
// scraper, and an email notifier.
//
// The web UI, auth, and REST surface live outside this crate.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;

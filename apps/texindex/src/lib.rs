//! # texindex
//!
//! Command-line front end for `texindex-core`: scene manifests, the
//! notify-backed file watcher and the clap command set.

pub mod cli;
pub mod manifest;
pub mod watcher;

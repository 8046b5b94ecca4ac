//! Shared types for the utawaku song tracker: the video catalog, chapter
//! resolution, label formatting, the HTTP wire types, configuration and
//! platform paths.

pub mod catalog;
pub mod config;
pub mod label;
pub mod platform;
pub mod protocol;
pub mod resolver;

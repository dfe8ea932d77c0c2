//! Link validation and the user-facing video catalog

pub mod catalog;
pub mod humanize;
mod link;

pub use catalog::{FormatOption, VideoInfo};
pub use link::MediaLink;

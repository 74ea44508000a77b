//! WordPress-to-Blogger migration library.
//!
//! Parses a WordPress XML export into posts with their approved comments and
//! replays them against the Blogger feed API: authenticate once, optionally
//! clear the destination blog, then publish each post followed by its
//! comments, strictly in document order.

#![allow(clippy::needless_raw_string_hashes)]

pub mod blogger;
pub mod config;
pub mod export;
pub mod migrate;

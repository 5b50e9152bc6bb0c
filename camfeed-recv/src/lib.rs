//! # camfeed-recv: capture stream receiver
//!
//! Connects to a camfeed host, splits the byte stream into wire frames,
//! validates each payload and optionally writes a sample of them to disk.

pub mod config;
pub mod receiver;

//! # camfeed-host: capture host
//!
//! Renders an animated test pattern into a CPU surface, runs the
//! [`camfeed_core::CaptureDriver`] once per rendered frame, and streams the
//! captured frames to a single TCP consumer.
//!
//! The first client to connect becomes the consumer; later connections
//! are closed immediately.

pub mod config;
pub mod renderer;
pub mod service;

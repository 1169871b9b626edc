//! Twitch Helix adapter for LiveTap
//!
//! Implements the `StreamSource` port over the Helix "Get Streams" listing,
//! which returns currently live broadcasts ordered by viewer count.

pub mod infrastructure;
pub mod model;

pub use infrastructure::{HelixConfig, HelixStreamSource};
pub use model::LiveStream;

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Streaming response body implementation.
pub mod body;

/// Error envelope formatting.
pub mod envelope;

/// Keep-alive relay between a pending result and a response body.
///
/// The relay's one-slot frame buffer collapses heartbeats that a slow client
/// has not consumed yet; the terminal document is always the final frame.
pub mod relay;

/// Response builder.
pub mod response;

pub use body::LongPollBody;
pub use envelope::{DefaultEnvelope, ErrorEnvelope};
pub use relay::RelayFrame;
pub use response::StreamingResponse;

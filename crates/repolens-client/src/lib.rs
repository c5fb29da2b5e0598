//! Client side of the streaming relay.
//!
//! One submission flows through three pieces: the [`http::StreamClient`]
//! opens the long-lived response, the [`reducer::TranscriptReducer`]
//! folds decoded events into the in-progress assistant turn, and the
//! [`controller::RunController`] orchestrates the whole run and owns its
//! cancellation handle.

pub mod controller;
pub mod http;
pub mod reducer;

pub use controller::{RunController, RunOutcome};
pub use http::StreamClient;
pub use reducer::TranscriptReducer;

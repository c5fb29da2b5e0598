//! HTTP gateway for the RepoLens streaming relay.

pub mod conversations;
pub mod server;
pub mod state;
pub mod stream;

pub use server::{router, start_gateway};
pub use state::GatewayState;

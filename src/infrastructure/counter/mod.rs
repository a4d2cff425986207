//! Counter service and its reservation client.
//!
//! One process owns the budgets ([`state::CounterState`]) behind an axum
//! HTTP surface ([`server`], [`handlers`]); workers speak the protocol
//! through [`client::CounterClient`] using the shared wire [`types`].

pub mod client;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

pub use client::{CounterClient, CounterClientError};
pub use handlers::AppState;
pub use state::CounterState;

//! # Relay Node
//!
//! Control plane of a meta-transaction relay. Accepts signed relay requests
//! over HTTP and forwards them to a [`RelayEngine`] once the node is staked,
//! funded, price-synced and registered on its hub.
//!
//! ## Quick Start
//! ```bash
//! cargo run --bin relay-node -- --relay-hub-address 0x... --debug-api
//! ```
//!
//! ## Endpoints
//! - `POST /relay` - Sign and broadcast a relayed transaction (gated on readiness)
//! - `GET /getaddr` - Relay address, minimum gas price and readiness
//! - `POST /setRelayHub` - Switch hub and restart background loops (debug only)
//! - `POST /audit` - Audit a signed relay transaction (opt-in)
//! - `GET /metrics` - Prometheus metrics

pub mod bootstrap;
pub mod config;
pub mod engine;
mod error;
mod handlers;
pub mod key_store;
pub mod lifecycle;
mod metrics;
mod middleware;
pub mod readiness;
mod router;
pub mod scheduler;
mod state;

pub use config::Config;
pub use engine::{ChainEngine, RelayEngine};
pub use error::Error;
pub use lifecycle::BackgroundLoops;
pub use readiness::ReadinessGate;
pub use router::create as create_router;
pub use state::AppState;

//! HTTP relay between parley chat clients and the assistant backend.
//!
//! The relay accepts a stream request for a conversation, opens the response
//! on the backend and forwards the body byte for byte. It does not interpret
//! frames; clients run the session crate's decoder on what arrives.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  POST /v1/conversations/:id/stream  ┌──────────────────┐
//! │ parley client│ ──────────────────────────────────▶ │  parley-gateway  │
//! │  (session)   │ ◀────────── streamed body ───────── │  RelayClient     │
//! └──────────────┘                                     └──────────────────┘
//!                                                               │
//!                                                 POST /chat/:id│
//!                                                               ▼
//!                                                      ┌──────────────────┐
//!                                                      │ assistant backend│
//!                                                      └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use parley_gateway::{create_router, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::default();
//! let listen_addr = config.listen_addr.clone();
//! let state = GatewayState::from_config(config)?;
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use relay::RelayClient;
pub use routes::create_router;
pub use state::GatewayState;

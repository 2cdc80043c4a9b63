//! # Peril Client
//!
//! One player's client for Peril, a multiplayer war game played over a
//! message bus, plus the bus server the players share.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PERIL CLIENT                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rule evaluators (no I/O)                  │
//! │  ├── state.rs    - Game state, units and locations           │
//! │  ├── spawn.rs    - Unit spawning                             │
//! │  ├── moves.rs    - Army moves                                │
//! │  ├── war.rs      - War resolution                            │
//! │  ├── pause.rs    - Pause signals                             │
//! │  └── gamelog.rs  - Game log records                          │
//! │                                                              │
//! │  bus/            - Message bus                               │
//! │  ├── routing.rs  - Exchange names and routing keys           │
//! │  ├── broker.rs   - Broker (exchanges, queues, unacked)       │
//! │  ├── channel.rs  - Connections, channels, deliveries         │
//! │  ├── wire.rs     - WebSocket link frames                     │
//! │  ├── link.rs     - Bus server over WebSocket                 │
//! │  ├── remote.rs   - Client end of the link                    │
//! │  └── pubsub.rs   - Typed publish/subscribe, ack types        │
//! │                                                              │
//! │  client/         - Player wiring                             │
//! │  ├── handlers.rs - Event handlers and dispositions           │
//! │  ├── outbound.rs - Outbound messages                         │
//! │  ├── commands.rs - Operator command loop                     │
//! │  └── console.rs  - Operator console and prompt               │
//! │                                                              │
//! │  server.rs       - Server operator: pause, resume, game logs │
//! │  config.rs       - Environment configuration                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dispositions
//!
//! Every inbound event ends in exactly one of ack, nack-requeue or
//! nack-discard. The choice is made by pure functions in
//! [`client::handlers`] from the rule outcome and the status of any
//! follow-up publish, so the whole table is testable without a bus.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod bus;
pub mod client;
pub mod config;
pub mod game;
pub mod server;

// Re-export commonly used types
pub use bus::{declare_peril_topology, AckType, BusConnection, BusServer, MemoryBroker, Publisher};
pub use client::{ClientError, PerilClient};
pub use config::{ClientConfig, ConfigError, ServerConfig, DEFAULT_CONFIRM_TIMEOUT};
pub use game::{GameError, GameState, Location, UnitRank};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

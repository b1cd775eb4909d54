//! # SLIPSTREAM
//!
//! Entity-state replication, wired to the racing content and run headless.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SLIPSTREAM                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐   │
//! │  │ slipstream_core │     │ slipstream_net  │     │slipstream_shared│   │
//! │  │                 │────>│                 │<────│                 │   │
//! │  │  • ECS          │     │  • Snapshots    │     │  • Components   │   │
//! │  │  • Type registry│     │  • Sessions     │     │  • Entity types │   │
//! │  │  • Dirty track  │     │  • Events       │     │  • Events       │   │
//! │  └─────────────────┘     │  • Transport    │     │  • Systems      │   │
//! │                          └────────┬────────┘     └─────────────────┘   │
//! │                                   │                                    │
//! │                          ┌────────▼────────┐                           │
//! │                          │   slipstream    │                           │
//! │                          │  • Match loop   │                           │
//! │                          │  • Demo config  │                           │
//! │                          └─────────────────┘                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: demo settings (TOML)
//! - `game_loop`: server and scripted drivers stepped frame by frame
//! - `error`: demo failures

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod game_loop;

pub use slipstream_core as core;
pub use slipstream_net as net;
pub use slipstream_shared as shared;

pub use config::{DemoConfig, LinkConfig};
pub use error::{DemoError, DemoResult};
pub use game_loop::{update_visuals, Driver, Feedback, FrameStats, MatchSummary, RaceMatch};

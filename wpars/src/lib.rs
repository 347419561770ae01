//! A Rust library for managing Wi-Fi through wpa_supplicant.
//!
//! This crate provides a high-level async API over the supplicant's control
//! socket, plus supervisors for the processes that complement it:
//!
//! - Querying interface status and scanning for hotspots
//! - Adding, configuring, selecting and removing stored network profiles
//! - Subscribing to connection and scan events
//! - Watching an interface continuously through `wpa_cli`
//! - Running an access point through the `create_ap` helper
//!
//! # Example
//!
//! ```no_run
//! use wpars::{ConnectOptions, Wireless};
//!
//! # async fn example() -> wpars::Result<()> {
//! let wifi = Wireless::new("wlan0");
//! wifi.open().await?;
//!
//! // Scan for visible hotspots
//! for hotspot in wifi.scan().await? {
//!     println!("{} ({}%)", hotspot.ssid, hotspot.quality());
//! }
//!
//! // Connect to a network
//! wifi.connect("MyNetwork", Some("password123"), ConnectOptions::default())
//!     .await?;
//!
//! wifi.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Replies and Events
//!
//! The control socket carries both the replies to commands and unsolicited
//! events. A single reader task classifies every datagram by its `<N>`
//! level marker: events go to the broadcast returned by
//! [`Wireless::events`] and never satisfy a pending command. Commands are
//! queued so that exactly one awaits a reply at a time.
//!
//! `SCAN` is acknowledged immediately but completes later with an event;
//! [`Wireless::scan`] waits for that event (bounded by
//! [`TimeoutConfig::scan`]) before fetching results.
//!
//! # Error Handling
//!
//! All operations return `Result<T, WpaError>`. A `FAIL` reply is a
//! [`WpaError::CommandFailed`], except for the profile operations
//! (`enable_network`, `remove_network`, ...) which return [`Reply::Fail`]
//! inline. Listing parsers never fail: malformed rows are dropped.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:
//!
//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

pub mod api;
mod core;
mod monitoring;
mod types;
mod util;

// Re-exported public API
pub use api::models::{
    ApEvent, ApOptions, ApState, AuthKind, ConnectOptions, ControlConfig, ControlEvent, EventKind,
    Hotspot, Mode, MonitorEvent, NetworkProfile, NetworkRef, ProfileFlags, Reply, TimeoutConfig,
    WpaError, WpaEvent, WpaStatus,
};
pub use api::wireless::Wireless;
pub use crate::core::access_point::AccessPoint;
pub use crate::core::control::ControlChannel;
pub use monitoring::monitor::Monitor;

/// A specialized `Result` type for supplicant operations.
pub type Result<T> = std::result::Result<T, WpaError>;

//! gust - LAN throughput testing with broadcast discovery
//!
//! Servers announce themselves by UDP broadcast; clients pick up an offer and
//! measure TCP and UDP download throughput against the advertised ports.
//!
//! # Library Usage
//!
//! gust can be used as a library for embedding speed tests in your application:
//!
//! ```ignore
//! use gust::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(ClientConfig {
//!         file_size: 10 * 1024 * 1024,
//!         ..Default::default()
//!     });
//!
//!     if let Some(server) = client.discover().await? {
//!         for report in client.run_transfers(&server).await {
//!             println!("{}", report);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`client`] - Client-side test orchestration
//! - [`serve`] - Server-side offer broadcasting and transfer handling
//! - [`discover`] - Offer broadcast and discovery
//! - [`protocol`] - Wire format for offers, requests, and segments
//! - [`tcp`], [`udp`] - Transport implementations
//! - [`stats`] - Throughput and delivery reporting

pub mod client;
pub mod config;
pub mod discover;
pub mod net;
pub mod protocol;
pub mod serve;
pub mod stats;
pub mod tcp;
pub mod udp;

pub use client::{Client, ClientConfig};
pub use discover::DiscoveredServer;
pub use protocol::{OfferMessage, Protocol, RequestMessage, SegmentHeader};
pub use serve::{Server, ServerConfig};
pub use stats::TransferReport;

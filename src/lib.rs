//! Cluster Spots - bridge DX cluster spots onto the panadapter of a
//! FlexRadio-style SDR.
//!
//! This crate provides:
//! - A nom-based parser for DX cluster lines
//! - A band classifier for spot frequencies
//! - A spot registry that deduplicates spots and tracks their lifetime
//! - An async SmartSDR command client with UDP discovery
//! - The pipeline that ties cluster, radio and operator console together
//!
//! # Example
//!
//! ```rust,no_run
//! use cluster_spots::{band::classify, parser::parse_spot};
//!
//! let spot = parse_spot("DX de K1ABC: 14025.0 W1XYZ CQ CQ DX 1234Z").expect("Failed to parse spot");
//! assert_eq!(classify(spot.frequency_khz), "20m");
//!
//! println!("{}", spot);
//! ```

pub mod band;
pub mod cluster;
pub mod config;
pub mod console;
pub mod parser;
pub mod pipeline;
pub mod radio;
pub mod registry;
pub mod shutdown;
pub mod spot;
pub mod stats;

pub use band::classify;
pub use cluster::{ClusterConfig, ClusterConnection};
pub use config::Config;
pub use console::Console;
pub use parser::{ClusterLine, ParseError, parse_line, parse_spot};
pub use pipeline::{Pipeline, PipelineSettings};
pub use radio::{CmdResult, FlexClient, Radio, RadioError};
pub use registry::{RegistrySettings, SpotKey, SpotRegistry};
pub use spot::SpotEvent;
pub use stats::{BridgeStats, StatsSummary};

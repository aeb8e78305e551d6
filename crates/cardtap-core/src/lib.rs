//! # cardtap Core Library
//!
//! Passive decoding of ISO/IEC 7816-3 smart-card I/O lines.
//!
//! This library provides:
//! - Convention detection (direct/inverse) from the ATR's TS character
//! - Fi/Di speed tables and baud rate renegotiation
//! - A per-line session engine that splits the byte stream into
//!   ATR, PPS, T=0 and T=1 packets
//! - Byte-level analyzers for each of those phases
//! - A serial capture loop that drives a session from a real port
//!
//! ## Example
//!
//! ```rust,ignore
//! use cardtap_core::{config::SessionConfig, session::{Session, LineObserver}};
//!
//! let mut session = Session::new(SessionConfig::default(), MyObserver::default())?;
//! for byte in captured {
//!     session.add_byte(byte);
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod convention;
pub mod error;
pub mod packet;
pub mod session;
pub mod timing;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analyzer::{Analysis, Analyzer, Negotiated, Protocol, Verdict};
    pub use crate::capture::{list_ports, LineSource, PortInfo, ReplaySource, ResetLine, SerialLine};
    pub use crate::config::{CaptureConfig, LineHandle, SessionConfig};
    pub use crate::convention::Convention;
    pub use crate::error::{CaptureError, ConfigError};
    pub use crate::packet::{Classification, Packet, PacketAssembler};
    pub use crate::session::{Callbacks, LineObserver, Phase, Session};
    pub use crate::timing::SpeedChange;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Phase analyzers
//!
//! Each session phase hands its bytes to an [`Analyzer`]. Analyzers own the
//! byte-level grammar of their phase, decide where packets end, and report
//! the parameters negotiated by ATR and PPS exchanges.
//!
//! The session engine never looks inside a [`Verdict`]; it only forwards it
//! with the packet it closed.

pub mod atr;
pub mod pps;
pub mod t0;
pub mod t1;

pub use atr::AtrAnalyzer;
pub use pps::PpsAnalyzer;
pub use t0::T0Analyzer;
pub use t1::T1Analyzer;

use serde::{Deserialize, Serialize};

use crate::packet::Classification;

/// Transmission protocol of the data phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Half-duplex character protocol
    T0,
    /// Half-duplex block protocol
    T1,
}

impl Protocol {
    /// Map the protocol type nibble of TDi or PPS0.
    ///
    /// Types other than T=0 and T=1 have no data analyzer and yield `None`.
    pub fn from_type(t: u8) -> Option<Self> {
        match t & 0x0F {
            0 => Some(Protocol::T0),
            1 => Some(Protocol::T1),
            _ => None,
        }
    }

    /// Protocol type number
    pub fn number(self) -> u8 {
        match self {
            Protocol::T0 => 0,
            Protocol::T1 => 1,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.number())
    }
}

/// Completion value reported by an analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Well-formed Answer-To-Reset
    Atr,
    /// ATR whose TCK does not match
    AtrChecksumError,
    /// Byte that cannot start an ATR
    AtrMalformed,
    /// PPS request sent by the reader
    PpsRequest,
    /// PPS response sent by the card
    PpsResponse,
    /// PPS message whose PCK does not match
    PpsChecksumError,
    /// Byte that cannot start a PPS message
    PpsMalformed,
    /// T=0 command header
    T0Header,
    /// T=0 procedure byte (NULL or ACK)
    T0Procedure,
    /// T=0 data transfer
    T0Data,
    /// T=0 status word
    T0Status,
    /// T=0 byte not valid where it appeared
    T0Unexpected,
    /// T=1 information block
    T1IBlock,
    /// T=1 receive-ready block
    T1RBlock,
    /// T=1 supervisory block
    T1SBlock,
    /// T=1 block whose epilogue does not match
    T1ChecksumError,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Verdict::Atr => "ATR",
            Verdict::AtrChecksumError => "ATR (bad TCK)",
            Verdict::AtrMalformed => "ATR (malformed)",
            Verdict::PpsRequest => "PPS request",
            Verdict::PpsResponse => "PPS response",
            Verdict::PpsChecksumError => "PPS (bad PCK)",
            Verdict::PpsMalformed => "PPS (malformed)",
            Verdict::T0Header => "T=0 header",
            Verdict::T0Procedure => "T=0 procedure",
            Verdict::T0Data => "T=0 data",
            Verdict::T0Status => "T=0 status",
            Verdict::T0Unexpected => "T=0 unexpected",
            Verdict::T1IBlock => "T=1 I-block",
            Verdict::T1RBlock => "T=1 R-block",
            Verdict::T1SBlock => "T=1 S-block",
            Verdict::T1ChecksumError => "T=1 (bad EDC)",
        };
        f.write_str(name)
    }
}

/// Outcome of feeding one byte to an analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    /// How the bytes buffered so far are classified
    pub classification: Classification,
    /// Whether the phase finished and [`Analyzer::negotiated`] is valid
    pub phase_complete: bool,
}

impl Analysis {
    /// Byte accepted, packet still open
    pub fn pending() -> Self {
        Self {
            classification: Classification::Continue,
            phase_complete: false,
        }
    }

    /// Packet closed as line noise
    pub fn noise() -> Self {
        Self {
            classification: Classification::Noise,
            phase_complete: false,
        }
    }

    /// Packet closed because the byte had nowhere to go
    pub fn state_error() -> Self {
        Self {
            classification: Classification::StateError,
            phase_complete: false,
        }
    }

    /// Packet closed with the given verdict
    pub fn packet(verdict: Verdict) -> Self {
        Self {
            classification: Classification::Analyzer(verdict),
            phase_complete: false,
        }
    }

    /// Packet closed with the given verdict and the phase is over
    pub fn complete(verdict: Verdict) -> Self {
        Self {
            classification: Classification::Analyzer(verdict),
            phase_complete: true,
        }
    }
}

/// Line parameters agreed on by a finished phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Negotiated {
    /// Protocol to use for the data phase, if the phase selected one
    pub protocol: Option<Protocol>,
    /// Fi/Di speed byte, if the phase changed the speed
    pub speed: Option<u8>,
}

/// Byte-level grammar of one session phase
pub trait Analyzer {
    /// Forget everything seen so far
    fn reset(&mut self);

    /// Consume one decoded byte
    fn analyze(&mut self, byte: u8) -> Analysis;

    /// Parameters negotiated by the last completed phase
    fn negotiated(&self) -> Negotiated {
        Negotiated::default()
    }
}

/// XOR of all bytes, used by TCK, PCK and the T=1 LRC
pub(crate) fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

//! Packet assembly
//!
//! Every phase of a session shares one fixed-capacity buffer. Bytes are
//! collected until an analyzer classifies them, then the buffer is flushed
//! as a [`Packet`] and cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::Verdict;

/// Default capacity of the packet buffer in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 512;

/// How a run of bytes was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Packet not finished yet, keep buffering
    Continue,
    /// Bytes that are not protocol content (idle fill, stale bytes on reset)
    Noise,
    /// Byte arrived with no valid dispatch path
    StateError,
    /// Completion reported by a phase analyzer
    Analyzer(Verdict),
}

impl Classification {
    /// Whether this classification ends the current packet
    pub fn is_boundary(&self) -> bool {
        !matches!(self, Classification::Continue)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Continue => write!(f, "continue"),
            Classification::Noise => write!(f, "noise"),
            Classification::StateError => write!(f, "state error"),
            Classification::Analyzer(verdict) => write!(f, "{}", verdict),
        }
    }
}

/// A completed packet handed to the observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Bytes of the packet, after convention decoding
    pub data: Vec<u8>,
    /// Classification that closed the packet
    pub classification: Classification,
    /// Arrival time of the first byte
    pub timestamp: DateTime<Utc>,
}

impl Packet {
    /// Packet length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the packet carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Space separated upper case hex dump of the data
    pub fn hex(&self) -> String {
        self.data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Bounded byte buffer with first-byte timestamping
#[derive(Debug, Clone)]
pub struct PacketAssembler {
    /// Backing storage, fixed at construction
    buf: Box<[u8]>,
    /// Occupied length
    len: usize,
    /// Arrival time of the first buffered byte
    timestamp: Option<DateTime<Utc>>,
}

impl PacketAssembler {
    /// Create an empty assembler holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            timestamp: None,
        }
    }

    /// Append a byte.
    ///
    /// Returns `false` and leaves the buffer untouched when it is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        if self.len == 0 {
            self.timestamp = Some(Utc::now());
        }
        self.buf[self.len] = byte;
        self.len += 1;
        true
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Maximum number of bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Whether no byte is buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether another byte would be dropped
    pub fn is_full(&self) -> bool {
        self.len >= self.buf.len()
    }

    /// Buffered bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Arrival time of the first buffered byte
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Build a packet from the buffered bytes and clear the buffer
    pub fn flush(&mut self, classification: Classification) -> Packet {
        let packet = Packet {
            data: self.as_bytes().to_vec(),
            classification,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        self.clear();
        packet
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.len = 0;
        self.timestamp = None;
    }
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_and_flush() {
        let mut asm = PacketAssembler::with_capacity(4);
        assert!(asm.is_empty());
        assert!(asm.timestamp().is_none());

        assert!(asm.push(0x3B));
        let first = asm.timestamp().expect("timestamp after first byte");
        assert!(asm.push(0x00));
        assert_eq!(asm.timestamp(), Some(first));

        let packet = asm.flush(Classification::Noise);
        assert_eq!(packet.data, vec![0x3B, 0x00]);
        assert_eq!(packet.len(), 2);
        assert!(!packet.is_empty());
        assert_eq!(packet.classification, Classification::Noise);
        assert_eq!(packet.timestamp, first);
        assert!(asm.is_empty());
        assert!(asm.timestamp().is_none());
    }

    #[test]
    fn test_overflow_keeps_prefix() {
        let mut asm = PacketAssembler::with_capacity(3);
        assert!(asm.push(1));
        assert!(asm.push(2));
        assert!(asm.push(3));
        assert!(asm.is_full());
        assert!(!asm.push(4));
        assert_eq!(asm.as_bytes(), &[1, 2, 3]);
        assert_eq!(asm.len(), asm.capacity());
    }

    #[test]
    fn test_no_leak_across_flush() {
        let mut asm = PacketAssembler::with_capacity(8);
        for b in [0xAA, 0xBB, 0xCC] {
            asm.push(b);
        }
        asm.flush(Classification::StateError);
        asm.push(0x01);
        let packet = asm.flush(Classification::Noise);
        assert_eq!(packet.data, vec![0x01]);
    }

    #[test]
    fn test_flush_empty_buffer() {
        let mut asm = PacketAssembler::with_capacity(2);
        let packet = asm.flush(Classification::Noise);
        assert!(packet.is_empty());
        assert_eq!(packet.len(), 0);
    }

    #[test]
    fn test_hex_dump() {
        let mut asm = PacketAssembler::default();
        asm.push(0x3B);
        asm.push(0x0A);
        assert_eq!(asm.flush(Classification::Noise).hex(), "3B 0A");
    }
}

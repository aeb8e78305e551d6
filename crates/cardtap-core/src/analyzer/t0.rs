//! T=0 character protocol framing
//!
//! A T=0 exchange starts with a five byte command header `CLA INS P1 P2 P3`
//! from the reader. The card then answers with procedure bytes:
//! - `60` NULL: more time requested
//! - `INS`: all remaining data bytes follow
//! - `INS ^ FF`: one data byte follows
//! - `6X` (except `60`) or `9X`: SW1, followed by SW2, ends the exchange
//!
//! The line is sniffed without knowing the transfer direction, so data bytes
//! are counted from P3 only.

use super::{Analysis, Analyzer, Verdict};

const HEADER_LEN: usize = 5;
const NULL_BYTE: u8 = 0x60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Header,
    Procedure,
    Data,
    StatusWord,
}

/// Incremental T=0 framing analyzer
#[derive(Debug, Clone, Default)]
pub struct T0Analyzer {
    stage: Stage,
    header_len: usize,
    ins: u8,
    /// Data bytes not yet transferred for the current command
    remaining: usize,
    /// Data bytes left in the current chunk
    chunk_left: usize,
}

impl T0Analyzer {
    /// Create an analyzer waiting for a command header
    pub fn new() -> Self {
        Self::default()
    }

    fn is_sw1(byte: u8) -> bool {
        byte != NULL_BYTE && matches!(byte & 0xF0, 0x60 | 0x90)
    }

    fn procedure(&mut self, byte: u8) -> Analysis {
        if byte == NULL_BYTE {
            return Analysis::packet(Verdict::T0Procedure);
        }
        if Self::is_sw1(byte) {
            self.stage = Stage::StatusWord;
            return Analysis::pending();
        }
        let chunk = if byte == self.ins {
            self.remaining
        } else if byte == self.ins ^ 0xFF {
            self.remaining.min(1)
        } else {
            tracing::trace!("unexpected T=0 procedure byte {:02X}", byte);
            *self = Self::default();
            return Analysis::packet(Verdict::T0Unexpected);
        };
        if chunk > 0 {
            self.chunk_left = chunk;
            self.stage = Stage::Data;
        }
        Analysis::packet(Verdict::T0Procedure)
    }
}

impl Analyzer for T0Analyzer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn analyze(&mut self, byte: u8) -> Analysis {
        match self.stage {
            Stage::Header => {
                self.header_len += 1;
                match self.header_len {
                    2 => self.ins = byte,
                    HEADER_LEN => {
                        self.remaining = if byte == 0 { 256 } else { usize::from(byte) };
                        self.header_len = 0;
                        self.stage = Stage::Procedure;
                        return Analysis::packet(Verdict::T0Header);
                    }
                    _ => {}
                }
                Analysis::pending()
            }
            Stage::Procedure => self.procedure(byte),
            Stage::Data => {
                self.chunk_left -= 1;
                self.remaining -= 1;
                if self.chunk_left > 0 {
                    return Analysis::pending();
                }
                self.stage = Stage::Procedure;
                Analysis::packet(Verdict::T0Data)
            }
            Stage::StatusWord => {
                *self = Self::default();
                Analysis::packet(Verdict::T0Status)
            }
        }
    }
}

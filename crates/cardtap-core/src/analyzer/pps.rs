//! Protocol and Parameters Selection grammar
//!
//! A PPS exchange is a request from the reader followed by the card's
//! response, both shaped the same way (ISO/IEC 7816-3 section 9.2):
//! - PPSS: `FF`
//! - PPS0: bits 5..7 announce PPS1..PPS3, low nibble is the protocol type
//! - PPS1: Fi/Di speed byte
//! - PPS2, PPS3: reserved parameters
//! - PCK: XOR of every byte from PPSS to PCK is zero

use super::{xor_checksum, Analysis, Analyzer, Negotiated, Protocol, Verdict};

/// PPSS character starting every PPS message
pub const PPSS: u8 = 0xFF;

const PPS1_PRESENT: u8 = 0x10;
const PARAMETER_MASK: u8 = 0x70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Start,
    Format,
    Parameters,
    Check,
}

/// Incremental PPS request/response parser
#[derive(Debug, Clone, Default)]
pub struct PpsAnalyzer {
    stage: Stage,
    /// Bytes of the message being parsed
    message: Vec<u8>,
    /// Parameter bytes still expected
    pending: u8,
    /// Set once the request was seen, the next message is the response
    awaiting_response: bool,
    /// PPS1 sent in the request, if any
    requested_speed: Option<u8>,
    negotiated: Negotiated,
}

impl PpsAnalyzer {
    /// Create an analyzer waiting for a request
    pub fn new() -> Self {
        Self::default()
    }

    fn speed_byte(&self) -> Option<u8> {
        let pps0 = *self.message.get(1)?;
        if pps0 & PPS1_PRESENT != 0 {
            self.message.get(2).copied()
        } else {
            None
        }
    }

    fn end_of_message(&mut self) -> Analysis {
        let checksum_ok = xor_checksum(&self.message) == 0;
        let analysis = if !self.awaiting_response {
            self.requested_speed = self.speed_byte();
            self.awaiting_response = true;
            if checksum_ok {
                Analysis::packet(Verdict::PpsRequest)
            } else {
                Analysis::packet(Verdict::PpsChecksumError)
            }
        } else {
            self.awaiting_response = false;
            if checksum_ok {
                let speed = self.speed_byte();
                if speed.is_some() && speed != self.requested_speed {
                    tracing::debug!(
                        "PPS response speed {:02X?} differs from request {:02X?}",
                        speed,
                        self.requested_speed
                    );
                }
                self.negotiated = Negotiated {
                    protocol: self.message.get(1).and_then(|pps0| Protocol::from_type(*pps0)),
                    speed,
                };
                Analysis::complete(Verdict::PpsResponse)
            } else {
                self.negotiated = Negotiated::default();
                Analysis::complete(Verdict::PpsChecksumError)
            }
        };
        self.message.clear();
        self.stage = Stage::Start;
        analysis
    }
}

impl Analyzer for PpsAnalyzer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn analyze(&mut self, byte: u8) -> Analysis {
        match self.stage {
            Stage::Start => {
                if byte != PPSS {
                    return Analysis::packet(Verdict::PpsMalformed);
                }
                self.message.push(byte);
                self.stage = Stage::Format;
                Analysis::pending()
            }
            Stage::Format => {
                self.message.push(byte);
                self.pending = byte & PARAMETER_MASK;
                self.stage = if self.pending != 0 {
                    Stage::Parameters
                } else {
                    Stage::Check
                };
                Analysis::pending()
            }
            Stage::Parameters => {
                self.message.push(byte);
                self.pending &= self.pending - 1;
                if self.pending == 0 {
                    self.stage = Stage::Check;
                }
                Analysis::pending()
            }
            Stage::Check => {
                self.message.push(byte);
                self.end_of_message()
            }
        }
    }

    fn negotiated(&self) -> Negotiated {
        self.negotiated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Classification;
    use pretty_assertions::assert_eq;

    fn feed(pps: &mut PpsAnalyzer, bytes: &[u8]) -> Analysis {
        let (last, rest) = bytes.split_last().expect("non-empty message");
        for b in rest {
            assert_eq!(pps.analyze(*b), Analysis::pending());
        }
        pps.analyze(*last)
    }

    #[test]
    fn test_request_then_response() {
        let mut pps = PpsAnalyzer::new();
        // FF 10 13 FC: T=0, PPS1 = 13
        let request = feed(&mut pps, &[0xFF, 0x10, 0x13, 0xFC]);
        assert_eq!(request, Analysis::packet(Verdict::PpsRequest));

        let response = feed(&mut pps, &[0xFF, 0x10, 0x13, 0xFC]);
        assert_eq!(response, Analysis::complete(Verdict::PpsResponse));
        assert_eq!(
            pps.negotiated(),
            Negotiated {
                protocol: Some(Protocol::T0),
                speed: Some(0x13)
            }
        );
    }

    #[test]
    fn test_response_without_pps1() {
        let mut pps = PpsAnalyzer::new();
        feed(&mut pps, &[0xFF, 0x11, 0x96, 0x78]);
        // Card answers T=1 with default speed
        let response = feed(&mut pps, &[0xFF, 0x01, 0xFE]);
        assert_eq!(response, Analysis::complete(Verdict::PpsResponse));
        assert_eq!(
            pps.negotiated(),
            Negotiated {
                protocol: Some(Protocol::T1),
                speed: None
            }
        );
    }

    #[test]
    fn test_all_parameters() {
        let mut pps = PpsAnalyzer::new();
        let pck = xor_checksum(&[0xFF, 0x71, 0x18, 0x00, 0x00]);
        let request = feed(&mut pps, &[0xFF, 0x71, 0x18, 0x00, 0x00, pck]);
        assert_eq!(request, Analysis::packet(Verdict::PpsRequest));
    }

    #[test]
    fn test_bad_response_checksum() {
        let mut pps = PpsAnalyzer::new();
        feed(&mut pps, &[0xFF, 0x10, 0x13, 0xFC]);
        let response = feed(&mut pps, &[0xFF, 0x10, 0x13, 0x00]);
        assert_eq!(response, Analysis::complete(Verdict::PpsChecksumError));
        assert_eq!(pps.negotiated(), Negotiated::default());
    }

    #[test]
    fn test_malformed_start() {
        let mut pps = PpsAnalyzer::new();
        let analysis = pps.analyze(0x00);
        assert_eq!(
            analysis.classification,
            Classification::Analyzer(Verdict::PpsMalformed)
        );
        assert!(!analysis.phase_complete);
    }
}

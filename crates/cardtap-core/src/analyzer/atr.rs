//! Answer-To-Reset grammar
//!
//! ATR layout (ISO/IEC 7816-3 section 8.2):
//! - TS: convention character (`3B` direct, `3F` inverse)
//! - T0: Y1 in the high nibble, number of historical bytes K in the low nibble
//! - TAi TBi TCi TDi: interface bytes, presence given by Yi, TDi carries Yi+1
//!   and a protocol type T
//! - K historical bytes
//! - TCK: check byte, present unless only T=0 is indicated

use super::{Analysis, Analyzer, Negotiated, Protocol, Verdict};
use crate::convention::{TS_DIRECT, TS_INVERSE};
use crate::timing::DEFAULT_SPEED;

const TA: u8 = 0x10;
const TD: u8 = 0x80;

/// TA2 bit telling that implicit parameters apply instead of TA1
const TA2_IMPLICIT: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Ts,
    Format,
    Interface,
    Historical,
    Tck,
}

/// Incremental ATR parser
#[derive(Debug, Clone, Default)]
pub struct AtrAnalyzer {
    stage: Stage,
    /// Interface bytes still expected in the current group
    pending: u8,
    /// Index i of the current interface group
    group: u8,
    historical_left: u8,
    tck_required: bool,
    first_protocol: Option<u8>,
    ta1: Option<u8>,
    ta2: Option<u8>,
    /// Running XOR from T0 onwards
    check: u8,
    negotiated: Negotiated,
}

impl AtrAnalyzer {
    /// Create an analyzer waiting for TS
    pub fn new() -> Self {
        Self::default()
    }

    fn restart(&mut self) {
        let negotiated = self.negotiated;
        *self = Self {
            negotiated,
            ..Self::default()
        };
    }

    /// Move past an exhausted interface group
    fn next_section(&mut self) -> Analysis {
        if self.pending != 0 {
            return Analysis::pending();
        }
        if self.historical_left > 0 {
            self.stage = Stage::Historical;
            return Analysis::pending();
        }
        self.after_historical()
    }

    fn after_historical(&mut self) -> Analysis {
        if self.tck_required {
            self.stage = Stage::Tck;
            return Analysis::pending();
        }
        self.finish(true)
    }

    fn finish(&mut self, checksum_ok: bool) -> Analysis {
        if !checksum_ok {
            tracing::debug!("ATR check byte mismatch");
            self.negotiated = Negotiated::default();
            self.restart();
            return Analysis::complete(Verdict::AtrChecksumError);
        }

        self.negotiated = match self.ta2 {
            // Specific mode: the card runs the protocol named in TA2 right away
            Some(ta2) => Negotiated {
                protocol: Protocol::from_type(ta2),
                speed: if ta2 & TA2_IMPLICIT == 0 {
                    Some(self.ta1.unwrap_or(DEFAULT_SPEED))
                } else {
                    None
                },
            },
            None => Negotiated {
                protocol: Protocol::from_type(self.first_protocol.unwrap_or(0)),
                speed: None,
            },
        };
        tracing::debug!(
            "ATR complete: protocol {:?}, speed {:?}",
            self.negotiated.protocol,
            self.negotiated.speed
        );
        self.restart();
        Analysis::complete(Verdict::Atr)
    }

    fn interface_byte(&mut self, byte: u8) -> Analysis {
        let kind = self.pending & self.pending.wrapping_neg();
        self.pending &= !kind;
        match kind {
            TA if self.group == 1 => self.ta1 = Some(byte),
            TA if self.group == 2 => self.ta2 = Some(byte),
            TD => {
                let protocol = byte & 0x0F;
                self.first_protocol.get_or_insert(protocol);
                if protocol != 0 {
                    self.tck_required = true;
                }
                self.pending = byte & 0xF0;
                self.group += 1;
            }
            // TBi, TCi and TAi beyond the second group are not tracked
            _ => {}
        }
        self.next_section()
    }
}

impl Analyzer for AtrAnalyzer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn analyze(&mut self, byte: u8) -> Analysis {
        match self.stage {
            Stage::Ts => {
                if byte != TS_DIRECT && byte != TS_INVERSE {
                    return Analysis::packet(Verdict::AtrMalformed);
                }
                self.stage = Stage::Format;
                Analysis::pending()
            }
            Stage::Format => {
                self.check = byte;
                self.pending = byte & 0xF0;
                self.historical_left = byte & 0x0F;
                self.group = 1;
                self.stage = Stage::Interface;
                self.next_section()
            }
            Stage::Interface => {
                self.check ^= byte;
                self.interface_byte(byte)
            }
            Stage::Historical => {
                self.check ^= byte;
                self.historical_left -= 1;
                if self.historical_left > 0 {
                    return Analysis::pending();
                }
                self.after_historical()
            }
            Stage::Tck => {
                let ok = self.check ^ byte == 0;
                self.finish(ok)
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
    use crate::analyzer::xor_checksum;
    use crate::packet::Classification;
    use pretty_assertions::assert_eq;

    fn feed(analyzer: &mut AtrAnalyzer, bytes: &[u8]) -> Vec<Analysis> {
        bytes.iter().map(|b| analyzer.analyze(*b)).collect()
    }

    fn assert_completes_on_last(results: &[Analysis], verdict: Verdict) {
        let (last, rest) = results.split_last().expect("at least one byte");
        assert!(rest.iter().all(|a| *a == Analysis::pending()));
        assert_eq!(*last, Analysis::complete(verdict));
    }

    #[test]
    fn test_minimal_atr() {
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x00]);
        assert_completes_on_last(&results, Verdict::Atr);
        assert_eq!(
            atr.negotiated(),
            Negotiated {
                protocol: Some(Protocol::T0),
                speed: None
            }
        );
    }

    #[test]
    fn test_t0_atr_with_historical_bytes() {
        // TA1 present, three historical bytes, no TCK for T=0 only
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x13, 0x96, 0x41, 0x42, 0x43]);
        assert_completes_on_last(&results, Verdict::Atr);
        // Negotiable mode: TA1 only takes effect after PPS
        assert_eq!(atr.negotiated().speed, None);
        assert_eq!(atr.negotiated().protocol, Some(Protocol::T0));
    }

    #[test]
    fn test_specific_mode_t1() {
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x90, 0x13, 0x11, 0x01, 0x93]);
        assert_completes_on_last(&results, Verdict::Atr);
        assert_eq!(
            atr.negotiated(),
            Negotiated {
                protocol: Some(Protocol::T1),
                speed: Some(0x13)
            }
        );
    }

    #[test]
    fn test_specific_mode_implicit_parameters() {
        // TA2 = 0x11: implicit values, T=1
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x90, 0x13, 0x11, 0x11, 0x83]);
        assert_completes_on_last(&results, Verdict::Atr);
        assert_eq!(atr.negotiated().speed, None);
        assert_eq!(atr.negotiated().protocol, Some(Protocol::T1));
    }

    #[test]
    fn test_negotiable_t1_first_offer() {
        // TD1 = 0x81 (TD2 follows, T=1), TD2 = 0x01 (T=1), TCK
        let tck = xor_checksum(&[0x80, 0x81, 0x01]);
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x80, 0x81, 0x01, tck]);
        assert_completes_on_last(&results, Verdict::Atr);
        assert_eq!(atr.negotiated().protocol, Some(Protocol::T1));
        assert_eq!(atr.negotiated().speed, None);
    }

    #[test]
    fn test_bad_tck() {
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[0x3B, 0x90, 0x13, 0x11, 0x01, 0x00]);
        assert_completes_on_last(&results, Verdict::AtrChecksumError);
        assert_eq!(atr.negotiated(), Negotiated::default());
    }

    #[test]
    fn test_inverse_ts_accepted() {
        let mut atr = AtrAnalyzer::new();
        let results = feed(&mut atr, &[TS_INVERSE, 0x00]);
        assert_completes_on_last(&results, Verdict::Atr);
    }

    #[test]
    fn test_bad_ts_restarts() {
        let mut atr = AtrAnalyzer::new();
        let first = atr.analyze(0x42);
        assert_eq!(
            first.classification,
            Classification::Analyzer(Verdict::AtrMalformed)
        );
        assert!(!first.phase_complete);
        let results = feed(&mut atr, &[0x3B, 0x00]);
        assert_completes_on_last(&results, Verdict::Atr);
    }

    #[test]
    fn test_reset_forgets_negotiation() {
        let mut atr = AtrAnalyzer::new();
        feed(&mut atr, &[0x3B, 0x90, 0x13, 0x11, 0x01, 0x93]);
        atr.reset();
        assert_eq!(atr.negotiated(), Negotiated::default());
    }
}

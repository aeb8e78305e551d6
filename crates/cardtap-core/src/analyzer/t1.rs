//! T=1 block protocol framing
//!
//! Block layout (ISO/IEC 7816-3 section 11.3):
//! - Prologue: NAD, PCB, LEN
//! - Information field: LEN bytes
//! - Epilogue: LRC, XOR of all preceding bytes of the block
//!
//! The PCB selects the block type: bit 8 clear for I-blocks, `10` in the two
//! high bits for R-blocks and `11` for S-blocks.

use super::{Analysis, Analyzer, Verdict};

const PROLOGUE_LEN: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Prologue,
    Information,
    Epilogue,
}

/// Incremental T=1 block analyzer
#[derive(Debug, Clone, Default)]
pub struct T1Analyzer {
    stage: Stage,
    prologue_len: u8,
    pcb: u8,
    info_left: u8,
    lrc: u8,
}

impl T1Analyzer {
    /// Create an analyzer waiting for a block prologue
    pub fn new() -> Self {
        Self::default()
    }

    fn block_verdict(pcb: u8) -> Verdict {
        match pcb & 0xC0 {
            0x80 => Verdict::T1RBlock,
            0xC0 => Verdict::T1SBlock,
            _ => Verdict::T1IBlock,
        }
    }
}

impl Analyzer for T1Analyzer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn analyze(&mut self, byte: u8) -> Analysis {
        match self.stage {
            Stage::Prologue => {
                self.lrc ^= byte;
                self.prologue_len += 1;
                match self.prologue_len {
                    2 => self.pcb = byte,
                    PROLOGUE_LEN => {
                        self.info_left = byte;
                        self.stage = if byte == 0 {
                            Stage::Epilogue
                        } else {
                            Stage::Information
                        };
                    }
                    _ => {}
                }
                Analysis::pending()
            }
            Stage::Information => {
                self.lrc ^= byte;
                self.info_left -= 1;
                if self.info_left == 0 {
                    self.stage = Stage::Epilogue;
                }
                Analysis::pending()
            }
            Stage::Epilogue => {
                let verdict = if self.lrc == byte {
                    Self::block_verdict(self.pcb)
                } else {
                    tracing::trace!("T=1 LRC mismatch: computed {:02X}, got {:02X}", self.lrc, byte);
                    Verdict::T1ChecksumError
                };
                *self = Self::default();
                Analysis::packet(verdict)
            }
        }
    }
}

//! Per-line mutable state

use serde::{Deserialize, Serialize};

use crate::analyzer::{
    pps::PPSS, Analysis, Analyzer, AtrAnalyzer, PpsAnalyzer, Protocol, T0Analyzer, T1Analyzer,
};
use crate::convention::Convention;
use crate::packet::PacketAssembler;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for the first ATR character, idle fill is ignored
    #[default]
    Init,
    /// Receiving the Answer-To-Reset
    Atr,
    /// Between exchanges, the next byte selects PPS or data
    Idle,
    /// Receiving a PPS request/response
    Pps,
    /// Exchanging T=0 data
    T0Data,
    /// Exchanging T=1 blocks
    T1Data,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Atr => "ATR",
            Phase::Idle => "idle",
            Phase::Pps => "PPS",
            Phase::T0Data => "T=0 data",
            Phase::T1Data => "T=1 data",
        };
        f.write_str(name)
    }
}

/// Everything the session tracks about one line
#[derive(Debug)]
pub(crate) struct LineState {
    pub phase: Phase,
    pub assembler: PacketAssembler,
    pub convention: Convention,
    pub protocol: Option<Protocol>,
    pub baud_rate: u32,
    atr: AtrAnalyzer,
    pps: PpsAnalyzer,
    t0: T0Analyzer,
    t1: T1Analyzer,
}

impl LineState {
    pub fn new(buffer_capacity: usize, base_baud_rate: u32) -> Self {
        Self {
            phase: Phase::Init,
            assembler: PacketAssembler::with_capacity(buffer_capacity),
            convention: Convention::Direct,
            protocol: None,
            baud_rate: base_baud_rate,
            atr: AtrAnalyzer::new(),
            pps: PpsAnalyzer::new(),
            t0: T0Analyzer::new(),
            t1: T1Analyzer::new(),
        }
    }

    /// Return to the power-on state. The buffer must already be flushed.
    pub fn reset(&mut self, base_baud_rate: u32) {
        self.assembler.clear();
        for analyzer in [
            &mut self.atr as &mut dyn Analyzer,
            &mut self.pps,
            &mut self.t0,
            &mut self.t1,
        ] {
            analyzer.reset();
        }
        self.phase = Phase::Init;
        self.convention = Convention::Direct;
        self.protocol = None;
        self.baud_rate = base_baud_rate;
    }

    /// Analyzer consuming bytes in `phase`
    pub fn analyzer_mut(&mut self, phase: Phase) -> Option<&mut dyn Analyzer> {
        match phase {
            Phase::Atr => Some(&mut self.atr),
            Phase::Pps => Some(&mut self.pps),
            Phase::T0Data => Some(&mut self.t0),
            Phase::T1Data => Some(&mut self.t1),
            Phase::Init | Phase::Idle => None,
        }
    }

    /// Route a decoded byte to the analyzer of the current phase, switching
    /// phase first when the byte starts a new one.
    pub fn dispatch(&mut self, byte: u8) -> Analysis {
        let next = match self.phase {
            Phase::Init if byte == 0x00 || byte == 0xFF => return Analysis::noise(),
            Phase::Init => Phase::Atr,
            Phase::Idle if byte == PPSS => Phase::Pps,
            Phase::Idle => match self.protocol {
                Some(Protocol::T0) => Phase::T0Data,
                Some(Protocol::T1) => Phase::T1Data,
                None => return Analysis::state_error(),
            },
            phase => phase,
        };
        self.phase = next;
        match self.analyzer_mut(next) {
            Some(analyzer) => analyzer.analyze(byte),
            None => Analysis::state_error(),
        }
    }
}

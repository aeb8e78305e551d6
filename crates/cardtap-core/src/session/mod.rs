//! Session engine
//!
//! A [`Session`] follows one smart-card line from power-on: it detects the
//! bit convention, splits the stream into ATR, PPS and data packets, and
//! keeps the negotiated protocol and baud rate in step with the card.
//!
//! Phase transitions:
//!
//! ```text
//! Init --(not 00/FF)--> Atr --(complete)--> Idle --(FF)--> Pps --(complete)--> Idle
//!                                            |
//!                                            +--(T=0)--> T0Data
//!                                            +--(T=1)--> T1Data
//! ```
//!
//! The session never fails. Unexpected bytes are reported as
//! [`Classification::Noise`] or [`Classification::StateError`] packets and
//! decoding carries on with the next byte.

mod observer;
mod state;

pub use observer::{Callbacks, LineObserver};
pub use state::Phase;

use crate::analyzer::{Analysis, Negotiated, Protocol};
use crate::config::SessionConfig;
use crate::convention::{self, Convention};
use crate::error::ConfigError;
use crate::packet::Classification;
use crate::timing;
use state::LineState;

/// Decoder for one physical line
pub struct Session<O: LineObserver> {
    config: SessionConfig,
    observer: O,
    state: LineState,
}

impl<O: LineObserver> Session<O> {
    /// Create a session and bring the line to its power-on state.
    ///
    /// The observer immediately receives the base baud rate.
    pub fn new(config: SessionConfig, observer: O) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = LineState::new(config.buffer_capacity, config.base_baud_rate);
        let mut session = Self {
            config,
            observer,
            state,
        };
        session.reset();
        Ok(session)
    }

    /// Handle a line reset (cold or warm).
    ///
    /// Bytes still buffered are emitted as one noise packet, then the
    /// convention, protocol, speed and all analyzers return to their
    /// power-on values.
    pub fn reset(&mut self) {
        if !self.state.assembler.is_empty() {
            let packet = self.state.assembler.flush(Classification::Noise);
            self.observer.packet_completed(&packet);
        }
        self.state.reset(self.config.base_baud_rate);
        tracing::debug!(line = %self.config.line, "session reset");
        self.observer
            .set_baud_rate(&self.config.line, self.config.base_baud_rate);
    }

    /// Feed one raw byte as read from the line
    pub fn add_byte(&mut self, raw: u8) {
        if self.state.phase == Phase::Init && convention::is_inverse_marker(raw) {
            self.state.convention = Convention::Inverse;
            self.observer.log_message("Switching to inverse convention");
        }
        let byte = self.state.convention.decode(raw);

        let analysis = if self.state.assembler.push(byte) {
            self.state.dispatch(byte)
        } else {
            tracing::debug!(
                line = %self.config.line,
                "packet buffer full ({} bytes), dropping {:02X}",
                self.state.assembler.capacity(),
                byte
            );
            Analysis::state_error()
        };

        if !analysis.classification.is_boundary() {
            return;
        }
        let packet = self.state.assembler.flush(analysis.classification);
        tracing::trace!(
            line = %self.config.line,
            phase = %self.state.phase,
            "{}: {}",
            packet.classification,
            packet.hex()
        );
        self.observer.packet_completed(&packet);

        if analysis.phase_complete {
            self.complete_phase();
        }
    }

    /// Feed a run of raw bytes in order
    pub fn add_bytes(&mut self, raw: &[u8]) {
        for byte in raw {
            self.add_byte(*byte);
        }
    }

    /// Apply what the finished ATR or PPS phase negotiated and go idle.
    ///
    /// Data analyzers manage their own framing, a completion from them
    /// changes nothing.
    fn complete_phase(&mut self) {
        let phase = self.state.phase;
        if !matches!(phase, Phase::Atr | Phase::Pps) {
            return;
        }
        let negotiated = self
            .state
            .analyzer_mut(phase)
            .map(|analyzer| analyzer.negotiated())
            .unwrap_or_default();
        self.apply(negotiated, phase);
        self.state.phase = Phase::Idle;
    }

    fn apply(&mut self, negotiated: Negotiated, phase: Phase) {
        if let Some(protocol) = negotiated.protocol {
            if self.state.protocol != Some(protocol) {
                self.state.protocol = Some(protocol);
                self.observer
                    .log_message(&format!("Switching to protocol {} after {}", protocol, phase));
            }
        }

        let Some(speed) = negotiated.speed else {
            return;
        };
        let change = timing::speed_change(self.config.base_baud_rate, self.state.baud_rate, speed);
        if let Some(change) = change {
            tracing::debug!(
                line = %self.config.line,
                "speed byte {:02X}: Fi={} Di={} f(max)={:?} kHz",
                speed,
                timing::clock_conversion(speed),
                timing::baud_divisor(speed),
                timing::max_clock_khz(speed)
            );
            self.observer.log_message(&format!(
                "Switching to {} ticks per ETU ({} baud) after {}",
                change.etu_ticks, change.baud_rate, phase
            ));
            self.state.baud_rate = change.baud_rate;
            self.observer
                .set_baud_rate(&self.config.line, change.baud_rate);
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Negotiated protocol, if any
    pub fn protocol(&self) -> Option<Protocol> {
        self.state.protocol
    }

    /// Baud rate the line is currently sampled at
    pub fn baud_rate(&self) -> u32 {
        self.state.baud_rate
    }

    /// Bit convention in use
    pub fn convention(&self) -> Convention {
        self.state.convention
    }

    /// Whether inverse convention was detected
    pub fn is_inverse(&self) -> bool {
        self.state.convention == Convention::Inverse
    }

    /// Bytes buffered for the packet in progress
    pub fn buffered(&self) -> &[u8] {
        self.state.assembler.as_bytes()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Observer receiving packets
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Mutable access to the observer
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Consume the session and return its observer
    pub fn into_observer(self) -> O {
        self.observer
    }
}

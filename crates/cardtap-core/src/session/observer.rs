//! Session callbacks

use crate::config::LineHandle;
use crate::packet::Packet;

/// Receives everything a session produces.
///
/// All methods are called synchronously from [`Session::add_byte`] and
/// [`Session::reset`]. A new baud rate passed to [`set_baud_rate`] must be in
/// effect before the next byte is delivered.
///
/// [`Session::add_byte`]: super::Session::add_byte
/// [`Session::reset`]: super::Session::reset
/// [`set_baud_rate`]: LineObserver::set_baud_rate
pub trait LineObserver {
    /// A packet was closed
    fn packet_completed(&mut self, packet: &Packet);

    /// The line must now be sampled at `baud_rate`
    fn set_baud_rate(&mut self, line: &LineHandle, baud_rate: u32);

    /// Human readable event (convention, protocol or speed switch)
    fn log_message(&mut self, message: &str) {
        tracing::info!("{}", message);
    }
}

impl<O: LineObserver + ?Sized> LineObserver for &mut O {
    fn packet_completed(&mut self, packet: &Packet) {
        (**self).packet_completed(packet)
    }

    fn set_baud_rate(&mut self, line: &LineHandle, baud_rate: u32) {
        (**self).set_baud_rate(line, baud_rate)
    }

    fn log_message(&mut self, message: &str) {
        (**self).log_message(message)
    }
}

/// Observer built from three closures
pub struct Callbacks<P, B, L> {
    /// Called for every completed packet
    pub packet_completed: P,
    /// Called when the line speed changes
    pub set_baud_rate: B,
    /// Called for log events
    pub log_message: L,
}

impl<P, B, L> LineObserver for Callbacks<P, B, L>
where
    P: FnMut(&Packet),
    B: FnMut(&LineHandle, u32),
    L: FnMut(&str),
{
    fn packet_completed(&mut self, packet: &Packet) {
        (self.packet_completed)(packet)
    }

    fn set_baud_rate(&mut self, line: &LineHandle, baud_rate: u32) {
        (self.set_baud_rate)(line, baud_rate)
    }

    fn log_message(&mut self, message: &str) {
        (self.log_message)(message)
    }
}

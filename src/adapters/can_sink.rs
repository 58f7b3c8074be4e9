//! CAN status sink: publishes every state-change record on the bus.
//!
//! The record is the 7-byte [`ChangeNotification`](crate::bus::ChangeNotification)
//! on standard id `0x48A`.  Other events are ignored here; pair this sink
//! with [`LogEventSink`](super::log_sink::LogEventSink) through [`Tee`]
//! to get both.

use embedded_can::blocking::Can;
use log::error;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::bus::BusMessage;

use super::hardware::transmit;

pub struct CanStatusSink<B> {
    bus: B,
    sent: u32,
    failed: u32,
}

impl<B: Can> CanStatusSink<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            sent: 0,
            failed: 0,
        }
    }

    /// Records successfully handed to the driver.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: Can> EventSink for CanStatusSink<B> {
    fn emit(&mut self, event: &AppEvent) {
        let AppEvent::StateChanged { record, .. } = event else {
            return;
        };
        match transmit(&mut self.bus, &BusMessage::status(record)) {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed += 1;
                error!("Status record not sent: {}", e);
            }
        }
    }
}

/// Fan one event stream out to two sinks.
pub struct Tee<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&mut self, event: &AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

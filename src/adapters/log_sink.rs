//! Log-based event sink adapter.
//!
//! [`LogEventSink`] implements [`EventSink`] by writing structured
//! controller events to the `log` facade (which goes to the UART on the
//! board).  The library never installs a backend.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to, record } => {
                info!(
                    "STATE | {:?} -> {:?} | record={:02X?}",
                    from,
                    to,
                    record.encode()
                );
            }
            AppEvent::FaultLatched(flags) => {
                warn!("FAULT | latched, flags=0b{:08b}, key cycle required", flags);
            }
            AppEvent::LatchCleared => {
                info!("FAULT | latch cleared by key cycle");
            }
            AppEvent::PrechargeDiverged(reason) => {
                warn!("PRECHARGE | diverged: {:?}", reason);
            }
            AppEvent::IsolationPolled { ok } => {
                debug!("ISOLATION | {}", if *ok { "OK" } else { "NOT OK" });
            }
            AppEvent::Status(s) => {
                debug!(
                    "STATUS | state={:?} | key={}/{} | sto={} latched={} attempts={} | \
                     pc={}dV pack={}dV | faults=0b{:08b}",
                    s.state,
                    u8::from(s.raw_key),
                    u8::from(s.key),
                    u8::from(s.safe),
                    u8::from(s.latched),
                    s.sto_attempts,
                    s.precharge_dv,
                    s.pack_dv,
                    s.fault_flags,
                );
            }
        }
    }
}

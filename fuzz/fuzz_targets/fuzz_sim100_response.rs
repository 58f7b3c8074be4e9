//! Fuzz target: `decode_response`
//!
//! The first input byte picks the command the reply is decoded against,
//! the rest is the CAN data field.  Decoding must never panic, and a
//! successful decode implies the command byte was echoed.
//!
//! cargo fuzz run fuzz_sim100_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use pvc_controller::sensors::isolation::{Sim100Command, Sim100Reading, decode_response};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, frame)) = data.split_first() else {
        return;
    };
    let command = Sim100Command::ALL[usize::from(selector) % Sim100Command::ALL.len()];

    if let Ok(reading) = decode_response(command, frame) {
        assert_eq!(frame[0], command.code());
        if let Sim100Reading::Isolation { status, code } = reading {
            assert_eq!(code.is_ok(), status & 0b11 == 0b00 || status & 0b11 == 0b10);
        }
    }
});

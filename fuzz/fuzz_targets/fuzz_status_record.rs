//! Fuzz target: `ChangeNotification::decode`
//!
//! Anything the decoder accepts must re-encode to exactly the same bytes.
//!
//! cargo fuzz run fuzz_status_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use pvc_controller::bus::ChangeNotification;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = ChangeNotification::decode(data) {
        assert_eq!(&record.encode()[..], data);
    }
});

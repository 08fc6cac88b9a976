#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_resp::{ParseError, Value};

fuzz_target!(|data: &[u8]| {
    match Value::parse(data) {
        Ok((value, consumed)) => {
            assert!(consumed > 0 && consumed <= data.len());

            // The consumed prefix alone parses to the same value.
            let (again, again_consumed) = Value::parse(&data[..consumed]).unwrap();
            assert_eq!(again, value);
            assert_eq!(again_consumed, consumed);
        }
        // Incomplete input stays incomplete with one more byte missing.
        Err(ParseError::Incomplete) => {
            if let Some((_, prefix)) = data.split_last() {
                assert!(Value::parse(prefix).is_err());
            }
        }
        // Parse errors are expected for malformed input - not a bug
        Err(_) => {}
    }
});

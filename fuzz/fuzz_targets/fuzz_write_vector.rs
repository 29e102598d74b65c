#![no_main]

use libfuzzer_sys::fuzz_target;
use lodestone_types::WriteVector;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding must never panic, and anything that decodes must survive a
    // canonical roundtrip.
    if let Ok(vector) = WriteVector::decode(input) {
        let canonical = vector.encode();
        let reparsed = WriteVector::decode(&canonical).expect("canonical form decodes");
        assert_eq!(reparsed, vector);
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use lodestone_types::SnapshotRecord;

fuzz_target!(|data: &[u8]| {
    // The metadata store hands back arbitrary bytes; record decoding must
    // reject garbage without panicking, and accepted records must
    // re-encode.
    if let Ok(record) = serde_json::from_slice::<SnapshotRecord<Vec<u64>>>(data) {
        let encoded = serde_json::to_vec(&record).expect("decoded record re-encodes");
        let reparsed: SnapshotRecord<Vec<u64>> =
            serde_json::from_slice(&encoded).expect("re-encoded record decodes");
        assert_eq!(reparsed.snapshot_version, record.snapshot_version);
        assert_eq!(reparsed.write_vector, record.write_vector);
    }
});

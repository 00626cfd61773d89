#![no_main]

use cacheshield::ds::BloomFilter;
use libfuzzer_sys::fuzz_target;

// Fuzz BloomFilter decoding with untrusted bytes
//
// Decoding must never panic; anything it accepts must survive a
// re-encode unchanged and answer membership queries.
fuzz_target!(|data: &[u8]| {
    let Ok(filter) = BloomFilter::from_bytes(data) else {
        return;
    };

    let encoded = filter.to_bytes();
    assert_eq!(encoded.as_slice(), data);
    assert_eq!(BloomFilter::from_bytes(&encoded).ok(), Some(filter.clone()));

    let _ = filter.has("probe");
    let stats = filter.stats();
    assert!((0.0..=1.0).contains(&stats.fill_ratio));
});

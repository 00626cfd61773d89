#![no_main]

use cacheshield::ds::BloomFilter;
use libfuzzer_sys::fuzz_target;

// Fuzz BloomFilter membership: no false negatives, ever
//
// The first two bytes size the filter; the rest are split into keys on 0xFF.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let expected = usize::from(data[0]) + 1;
    let rate = f64::from(data[1].max(1)) / 512.0;
    let mut filter = BloomFilter::new(expected, rate);

    let keys: Vec<String> = data[2..]
        .split(|b| *b == 0xFF)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .collect();

    for key in &keys {
        filter.add(key);
    }
    for key in &keys {
        assert!(filter.has(key), "false negative for {key:?}");
    }

    let mut merged = BloomFilter::new(expected, rate);
    merged.merge(&filter).expect("same parameters merge");
    for key in &keys {
        assert!(merged.has(key));
    }
});

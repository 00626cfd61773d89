#![no_main]

use std::collections::HashSet;

use cacheshield::ds::KeyIndex;
use libfuzzer_sys::fuzz_target;

// Fuzz arbitrary operation sequences on KeyIndex
//
// Keys are drawn from a small alphabet rich in separators and digits so the
// prefix split heuristic sees many shared leads. A HashSet shadows the index
// and must agree with it after every step.
fuzz_target!(|data: &[u8]| {
    const ALPHABET: &[u8] = b"ab:/_-01";

    let mut index = KeyIndex::new();
    let mut shadow: HashSet<String> = HashSet::new();

    for chunk in data.chunks(4) {
        let op = chunk[0] % 5;
        let key: String = chunk[1..]
            .iter()
            .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
            .collect();

        match op {
            0 => {
                index.add(&key);
                shadow.insert(key.clone());
                assert!(index.has(&key));
            }
            1 => {
                assert_eq!(index.delete(&key), shadow.remove(&key));
                assert!(!index.has(&key));
            }
            2 => {
                assert_eq!(index.has(&key), shadow.contains(&key));
            }
            3 => {
                // literal pattern: matches exactly the key if present
                if let Ok(found) = index.get_by_pattern(&key) {
                    assert_eq!(found.len(), usize::from(shadow.contains(&key)));
                }
            }
            _ => {
                let all = index.get_by_pattern("*").expect("wildcard compiles");
                assert_eq!(all.len(), shadow.len());
            }
        }

        assert_eq!(index.len(), shadow.len());
        index.debug_validate_invariants();
    }

    let mut keys = index.keys();
    keys.sort();
    let mut expected: Vec<String> = shadow.into_iter().collect();
    expected.sort();
    assert_eq!(keys, expected);
});

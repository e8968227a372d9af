//! Reflected binary Gray code tables.
//!
//! The wheels are striped so that walking one section in either direction
//! flips exactly one sensor band. The table for `n` bits is built by the
//! classic reflect-and-prefix construction: mirror the `n-1` bit table,
//! prefix the original half with `0` and the mirrored half with `1`.

use std::collections::HashMap;

/// Generate the full Gray code sequence for `bits`-wide codes.
///
/// Returns `2^bits` code words as strings of `0`/`1`, most significant bit
/// first, ordered so that neighbouring entries (including the wrap from the
/// last entry back to the first) differ in exactly one bit. `bits == 0`
/// yields an empty table.
pub fn generate(bits: u32) -> Vec<String> {
    if bits == 0 {
        return Vec::new();
    }

    let mut codes = vec!["0".to_string(), "1".to_string()];
    for _ in 1..bits {
        let half = codes.len();
        for index in (0..half).rev() {
            let mirrored = codes[index].clone();
            codes.push(mirrored);
        }
        for (index, code) in codes.iter_mut().enumerate() {
            let prefix = if index < half { '0' } else { '1' };
            code.insert(0, prefix);
        }
    }
    codes
}

/// Build the reverse lookup from code word to position index.
pub fn inverse(codes: &[String]) -> HashMap<String, u32> {
    codes
        .iter()
        .enumerate()
        .map(|(index, code)| (code.clone(), index as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hamming(a: &str, b: &str) -> usize {
        a.chars().zip(b.chars()).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn zero_bits_is_empty() {
        assert!(generate(0).is_empty());
    }

    #[test]
    fn one_bit_table() {
        assert_eq!(generate(1), vec!["0", "1"]);
    }

    #[test]
    fn two_bit_table() {
        assert_eq!(generate(2), vec!["00", "01", "11", "10"]);
    }

    #[test]
    fn three_bit_table() {
        assert_eq!(
            generate(3),
            vec!["000", "001", "011", "010", "110", "111", "101", "100"]
        );
    }

    #[test]
    fn six_bit_table_shape() {
        let codes = generate(6);
        assert_eq!(codes.len(), 64);
        assert!(codes.iter().all(|code| code.len() == 6));
    }

    #[test]
    fn inverse_maps_codes_back_to_indexes() {
        let codes = generate(4);
        let lookup = inverse(&codes);
        assert_eq!(lookup.len(), 16);
        for (index, code) in codes.iter().enumerate() {
            assert_eq!(lookup[code], index as u32);
        }
    }

    proptest! {
        /// Every table holds 2^bits distinct fixed-width codes.
        #[test]
        fn prop_table_is_a_permutation(bits in 1u32..=10) {
            let codes = generate(bits);
            prop_assert_eq!(codes.len(), 1 << bits);
            prop_assert!(codes.iter().all(|code| code.len() == bits as usize));

            let mut sorted = codes.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), codes.len());
        }

        /// Neighbouring codes differ in exactly one bit, wraparound included.
        #[test]
        fn prop_neighbours_differ_by_one_bit(bits in 1u32..=10) {
            let codes = generate(bits);
            for pair in codes.windows(2) {
                prop_assert_eq!(hamming(&pair[0], &pair[1]), 1);
            }
            let first = codes.first().unwrap();
            let last = codes.last().unwrap();
            prop_assert_eq!(hamming(first, last), 1);
        }
    }
}

//! Profile checksum: MD5 over the whole file with the three header fields
//! the standard defines as excluded from the profile ID computation
//! zeroed out (flags at 44..48, rendering intent at 64..68, and the ID
//! field itself at 84..100).

use md5::{Digest, Md5};

#[must_use]
pub fn compute(buf: &[u8]) -> [u8; 16] {
    let mut canon = buf.to_vec();
    for range in [44..48, 64..68, 84..100] {
        if range.end <= canon.len() {
            canon[range].fill(0);
        }
    }
    let mut hasher = Md5::new();
    hasher.update(&canon);
    hasher.finalize().into()
}

#[must_use]
pub fn to_hex(digest: &[u8; 16]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_fields_dont_affect_checksum() {
        let a = vec![0u8; 200];
        let mut b = vec![0u8; 200];
        b[44..48].copy_from_slice(&[1, 2, 3, 4]);
        b[64..68].copy_from_slice(&[5, 6, 7, 8]);
        b[84..100].fill(0xff);
        assert_eq!(compute(&a), compute(&b));
    }

    #[test]
    fn other_byte_changes_change_checksum() {
        let a = vec![0u8; 200];
        let mut b = a.clone();
        b[120] = 7;
        assert_ne!(compute(&a), compute(&b));
    }
}

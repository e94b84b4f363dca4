//! 64-bit string hashing for native-command registry keys, plus the
//! 4-word seeded hash behind `str.hash`.
//!
//! MurmurHash2 64-bit, used verbatim rather than reaching for a
//! `std::hash::Hasher`, since the hash value is part of the on-disk module
//! format and therefore needs to be a fixed, documented algorithm rather
//! than whatever `DefaultHasher` happens to compute this build.

const SEED: u64 = 0;
const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// MurmurHash2, 64-bit, as used by sink.h for native-command names.
pub fn hash64(bytes: &[u8]) -> u64 {
  let len = bytes.len();
  let mut h: u64 = SEED ^ (len as u64).wrapping_mul(M);

  let n = len / 8;
  for i in 0..n {
    let chunk = &bytes[i * 8..i * 8 + 8];
    let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
    k = k.wrapping_mul(M);
    k ^= k >> R;
    k = k.wrapping_mul(M);
    h ^= k;
    h = h.wrapping_mul(M);
  }

  let tail = &bytes[n * 8..];
  let mut last: u64 = 0;
  for (i, &b) in tail.iter().enumerate().rev() {
    last ^= (b as u64) << (8 * i);
  }
  if !tail.is_empty() {
    h ^= last;
    h = h.wrapping_mul(M);
  }

  h ^= h >> R;
  h = h.wrapping_mul(M);
  h ^= h >> R;
  h
}

/// Hashes a dotted native-command name, e.g. `"io.write"`.
pub fn hash_name(name: &str) -> u64 {
  hash64(name.as_bytes())
}

/// `str.hash(s, seed)`: four independent 32-bit words, each one the
/// bytes plus the seed plus a word index run back through [`hash64`] and
/// truncated. Four words rather than one `u64` so the result survives
/// exactly as four ordinary numbers without ever exceeding `f64`'s
/// 53-bit exact integer range.
pub fn hash_seeded4(bytes: &[u8], seed: u32) -> [u32; 4] {
  let mut out = [0u32; 4];
  for (i, word) in out.iter_mut().enumerate() {
    let mut buf = Vec::with_capacity(bytes.len() + 8);
    buf.extend_from_slice(bytes);
    buf.extend_from_slice(&seed.to_le_bytes());
    buf.extend_from_slice(&(i as u32).to_le_bytes());
    *word = hash64(&buf) as u32;
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deterministic() {
    assert_eq!(hash_name("io.write"), hash_name("io.write"));
  }

  #[test]
  fn distinct_names_differ() {
    assert_ne!(hash_name("io.write"), hash_name("io.read"));
  }

  #[test]
  fn seeded4_is_deterministic_and_seed_sensitive() {
    let a = hash_seeded4(b"hello", 0);
    let b = hash_seeded4(b"hello", 0);
    assert_eq!(a, b);
    let c = hash_seeded4(b"hello", 1);
    assert_ne!(a, c);
  }

  #[test]
  fn seeded4_words_are_distinct() {
    let words = hash_seeded4(b"hello", 42);
    let mut sorted = words;
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), words.len());
  }

  #[test]
  fn empty_input_does_not_panic() {
    let _ = hash64(&[]);
    let _ = hash64(b"a");
  }
}

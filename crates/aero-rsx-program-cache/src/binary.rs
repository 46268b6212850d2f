//! Content identity for program binaries.
//!
//! Both stage caches are keyed by ucode *content*. A key carries a 64-bit XXH3 digest of the
//! valid ucode next to the ucode itself: the map hashes only the digest, and equality checks
//! digest, then length, then the words. Fragment ucode is always cut to its scanned length
//! before it gets here, so trailing bytes past the end-of-program marker never take part in
//! either the digest or the comparison.

use std::hash::{Hash, Hasher};

use hashbrown::Equivalent;
use xxhash_rust::xxh3::xxh3_64;

pub fn vertex_ucode_hash(words: &[u32]) -> u64 {
    xxh3_64(bytemuck::cast_slice(words))
}

pub fn fragment_ucode_hash(ucode: &[u8]) -> u64 {
    xxh3_64(ucode)
}

/// Owned ucode stored as a cache key.
#[derive(Clone, Debug)]
pub struct UcodeKey<T> {
    hash: u64,
    ucode: Box<[T]>,
}

pub type VertexUcodeKey = UcodeKey<u32>;
pub type FragmentUcodeKey = UcodeKey<u8>;

impl<T> UcodeKey<T> {
    /// Builds a key from an owned buffer and the digest already computed for the probe.
    pub(crate) fn from_parts(hash: u64, ucode: Vec<T>) -> Self {
        Self {
            hash,
            ucode: ucode.into_boxed_slice(),
        }
    }

    pub fn digest(&self) -> u64 {
        self.hash
    }

    pub fn ucode(&self) -> &[T] {
        &self.ucode
    }

    pub fn as_probe(&self) -> UcodeRef<'_, T> {
        UcodeRef {
            hash: self.hash,
            ucode: &self.ucode,
        }
    }
}

impl<T: PartialEq> PartialEq for UcodeKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_probe().matches(&other.as_probe())
    }
}

impl<T: Eq> Eq for UcodeKey<T> {}

impl<T> Hash for UcodeKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Borrowed ucode used to probe a map of [`UcodeKey`]s without copying.
#[derive(Clone, Copy, Debug)]
pub struct UcodeRef<'a, T> {
    hash: u64,
    ucode: &'a [T],
}

impl<'a> UcodeRef<'a, u32> {
    pub fn vertex(words: &'a [u32]) -> Self {
        Self {
            hash: vertex_ucode_hash(words),
            ucode: words,
        }
    }
}

impl<'a> UcodeRef<'a, u8> {
    /// `ucode` must already be cut to the scanned program length.
    pub fn fragment(ucode: &'a [u8]) -> Self {
        Self {
            hash: fragment_ucode_hash(ucode),
            ucode,
        }
    }
}

impl<'a, T> UcodeRef<'a, T> {
    pub fn digest(&self) -> u64 {
        self.hash
    }

    pub fn ucode(&self) -> &'a [T] {
        self.ucode
    }

    fn matches(&self, other: &UcodeRef<'_, T>) -> bool
    where
        T: PartialEq,
    {
        self.hash == other.hash
            && self.ucode.len() == other.ucode.len()
            && self.ucode == other.ucode
    }

    pub fn to_key(self) -> UcodeKey<T>
    where
        T: Clone,
    {
        UcodeKey {
            hash: self.hash,
            ucode: self.ucode.into(),
        }
    }
}

impl<T> Hash for UcodeRef<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl<T: PartialEq> Equivalent<UcodeKey<T>> for UcodeRef<'_, T> {
    fn equivalent(&self, key: &UcodeKey<T>) -> bool {
        self.matches(&key.as_probe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    #[test]
    fn equal_vertex_words_share_a_key() {
        let a = [0x401f_9c6c, 0x0040_000d, 0x8106_c083, 0x6041_ff80];
        let b = a.to_vec();

        let key = UcodeRef::vertex(&a).to_key();
        assert_eq!(key, UcodeRef::vertex(&b).to_key());
        assert_eq!(key.digest(), vertex_ucode_hash(&b));
    }

    #[test]
    fn vertex_length_is_part_of_identity() {
        let long = [1u32, 2, 3, 4, 0, 0, 0, 0];
        let short = &long[..4];

        assert_ne!(UcodeRef::vertex(&long).to_key(), UcodeRef::vertex(short).to_key());
    }

    #[test]
    fn map_probe_finds_owned_key_by_content() {
        let ucode = vec![0xAAu8; 32];
        let mut map = HashMap::new();
        map.insert(UcodeRef::fragment(&ucode).to_key(), 7usize);

        // Same bytes from a different allocation.
        let copy = ucode.clone();
        assert_eq!(map.get(&UcodeRef::fragment(&copy)), Some(&7));

        let mut other = ucode.clone();
        other[31] = 0xAB;
        assert_eq!(map.get(&UcodeRef::fragment(&other)), None);
    }

    #[test]
    fn owned_key_matches_its_probe() {
        let ucode = vec![1u8, 2, 3, 4];
        let digest = UcodeRef::fragment(&ucode).digest();
        let key = UcodeKey::from_parts(digest, ucode);
        assert!(UcodeRef::fragment(&[1, 2, 3, 4]).equivalent(&key));
        assert_eq!(key.ucode(), &[1u8, 2, 3, 4]);
    }
}

//! Limits applied to guest-provided microcode.
//!
//! Vertex ucode arrives as an owned buffer and fragment ucode is scanned out of guest memory
//! until an end-of-program marker. Both are untrusted, so the cache bounds how much of either it
//! will read.

/// Largest RSX vertex program: 512 instruction slots of 4 dwords each.
pub const MAX_VERTEX_PROGRAM_WORDS: usize = 512 * 4;

/// Upper bound for the fragment end-of-program scan (4096 instruction slots).
pub const MAX_FRAGMENT_UCODE_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramCacheConfig {
    pub max_vertex_program_words: usize,
    pub max_fragment_ucode_bytes: usize,
}

impl Default for ProgramCacheConfig {
    fn default() -> Self {
        Self {
            max_vertex_program_words: MAX_VERTEX_PROGRAM_WORDS,
            max_fragment_ucode_bytes: MAX_FRAGMENT_UCODE_BYTES,
        }
    }
}

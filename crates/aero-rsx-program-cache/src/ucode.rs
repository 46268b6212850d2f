//! Minimal RSX fragment ucode decoding.
//!
//! The cache only needs two facts about a fragment program: where it ends, and where its inline
//! constants live. Instructions are 16 bytes (four dwords, read little-endian as they sit in
//! guest memory). Bit 8 of dword 0 marks the last instruction. Dwords 1..=3 are the source
//! operands; when any of them selects the constant register type the instruction is followed
//! by a 16-byte inline constant slot, which is skipped when walking the program.

use crate::error::ProgramCacheError;
use crate::guest_memory::{GuestMemory, GuestMemoryError};

pub const INSTRUCTION_BYTES: usize = 16;

/// Size of an inline constant slot: four 32-bit lanes.
pub const CONSTANT_BYTES: usize = 16;

const END_FLAG: u32 = 1 << 8;
const REGISTER_TYPE_SHIFT: u32 = 8;
const REGISTER_TYPE_MASK: u32 = 0x3;
const REGISTER_TYPE_CONSTANT: u32 = 2;

/// Returns true if the source operand reads an inline constant.
pub fn is_constant_operand(src: u32) -> bool {
    (src >> REGISTER_TYPE_SHIFT) & REGISTER_TYPE_MASK == REGISTER_TYPE_CONSTANT
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentInstruction {
    pub words: [u32; 4],
}

impl FragmentInstruction {
    pub fn from_bytes(bytes: &[u8; INSTRUCTION_BYTES]) -> Self {
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { words }
    }

    pub fn is_end(&self) -> bool {
        self.words[0] & END_FLAG != 0
    }

    pub fn has_inline_constant(&self) -> bool {
        self.words[1..].iter().copied().any(is_constant_operand)
    }

    /// Bytes covered by this instruction, including its inline constant slot.
    pub fn footprint(&self) -> usize {
        if self.has_inline_constant() {
            INSTRUCTION_BYTES + CONSTANT_BYTES
        } else {
            INSTRUCTION_BYTES
        }
    }
}

/// Scans guest memory at `addr` for the end-of-program marker and returns the program length
/// in bytes.
///
/// The scan never reads past `max_bytes`; a program that is still running at that point is
/// rejected rather than walked into unrelated memory.
pub fn fragment_ucode_size(
    mem: &dyn GuestMemory,
    addr: u64,
    max_bytes: usize,
) -> Result<usize, ProgramCacheError> {
    let unterminated = ProgramCacheError::UnterminatedFragmentProgram {
        addr,
        max: max_bytes,
    };

    let mut offset = 0usize;
    let mut bytes = [0u8; INSTRUCTION_BYTES];
    loop {
        if offset + INSTRUCTION_BYTES > max_bytes {
            return Err(unterminated);
        }
        let inst_addr = u64::try_from(offset)
            .ok()
            .and_then(|offset| addr.checked_add(offset))
            .ok_or(GuestMemoryError {
                addr,
                len: offset + INSTRUCTION_BYTES,
            })?;
        mem.read(inst_addr, &mut bytes)?;

        let inst = FragmentInstruction::from_bytes(&bytes);
        offset += inst.footprint();
        if inst.is_end() {
            if offset > max_bytes {
                return Err(unterminated);
            }
            return Ok(offset);
        }
    }
}

/// Byte offsets of every inline constant slot in `ucode`, in program order.
///
/// `ucode` is expected to be a complete program as measured by [`fragment_ucode_size`];
/// a truncated trailing instruction is ignored.
pub fn constant_offsets(ucode: &[u8]) -> Vec<u32> {
    let mut offsets = Vec::new();
    let mut offset = 0usize;
    while let Some(bytes) = ucode
        .get(offset..offset + INSTRUCTION_BYTES)
        .and_then(|b| <&[u8; INSTRUCTION_BYTES]>::try_from(b).ok())
    {
        let inst = FragmentInstruction::from_bytes(bytes);
        if inst.has_inline_constant() {
            let slot = offset + INSTRUCTION_BYTES;
            if slot + CONSTANT_BYTES > ucode.len() {
                break;
            }
            // Programs are bounded well below 4 GiB by the scan limit.
            offsets.push(slot as u32);
        }
        offset += inst.footprint();
        if inst.is_end() {
            break;
        }
    }
    offsets
}

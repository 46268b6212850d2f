//! Fragment constant upload.
//!
//! RSX fragment programs carry their constants inline, right after the instruction that reads
//! them, as four big-endian 32-bit lanes. Every draw re-reads them from guest memory (the game
//! may patch constants in place without changing the program) and packs them into a host
//! uniform buffer, one 16-byte slot per constant, lanes byte-swapped to little-endian.

use crate::error::ProgramCacheError;
use crate::guest_memory::GuestMemory;
use crate::ucode::CONSTANT_BYTES;

/// Byte-reverses each 32-bit lane of a constant, keeping lane order.
pub fn swap_constant_lanes(src: [u8; CONSTANT_BYTES]) -> [u8; CONSTANT_BYTES] {
    let mut dst = [0u8; CONSTANT_BYTES];
    for (out, lane) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let value = u32::from_be_bytes([lane[0], lane[1], lane[2], lane[3]]);
        out.copy_from_slice(&value.to_le_bytes());
    }
    dst
}

/// Reads the constants at `base + offset` for every offset and writes them to consecutive
/// 16-byte slots of `dst`.
///
/// `dst` must hold at least `offsets.len() * 16` bytes; otherwise nothing is written. Bytes
/// past the last slot are left untouched.
pub fn fill_fragment_constants(
    mem: &dyn GuestMemory,
    base: u64,
    offsets: &[u32],
    dst: &mut [u8],
) -> Result<(), ProgramCacheError> {
    let needed = offsets.len() * CONSTANT_BYTES;
    if dst.len() < needed {
        return Err(ProgramCacheError::ConstantBufferTooSmall {
            needed,
            actual: dst.len(),
        });
    }

    let mut src = [0u8; CONSTANT_BYTES];
    for (&offset, slot) in offsets.iter().zip(dst.chunks_exact_mut(CONSTANT_BYTES)) {
        let addr = base
            .checked_add(u64::from(offset))
            .ok_or(ProgramCacheError::ConstantAddressOverflow { addr: base, offset })?;
        mem.read(addr, &mut src)?;
        slot.copy_from_slice(&swap_constant_lanes(src));
    }
    Ok(())
}

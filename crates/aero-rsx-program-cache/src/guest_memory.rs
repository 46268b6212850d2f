//! Guest memory access used to read fragment ucode and its inline constants.
//!
//! Fragment programs are not handed to the cache as owned buffers; the command stream only
//! carries an address. The emulator's memory subsystem implements [`GuestMemory`] so the cache
//! can pull bytes out on demand.

use core::fmt;
use std::cell::{Ref, RefCell};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestMemoryError {
    pub addr: u64,
    pub len: usize,
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "guest memory read out of bounds: addr=0x{:x}, len=0x{:x}",
            self.addr, self.len
        )
    }
}

impl std::error::Error for GuestMemoryError {}

/// Read-only view of the guest address space.
pub trait GuestMemory {
    fn read(&self, addr: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
}

/// Contiguous guest RAM starting at address 0, for tests and offline tooling.
#[derive(Clone, Debug)]
pub struct VecGuestMemory {
    mem: RefCell<Vec<u8>>,
}

impl VecGuestMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            mem: RefCell::new(vec![0u8; size_bytes]),
        }
    }

    pub fn as_slice(&self) -> Ref<'_, [u8]> {
        Ref::map(self.mem.borrow(), |v| v.as_slice())
    }

    pub fn write(&self, addr: u64, data: &[u8]) -> Result<(), GuestMemoryError> {
        let range = checked_range(addr, data.len())?;
        let mut mem = self.mem.borrow_mut();
        let slice = mem.get_mut(range).ok_or(GuestMemoryError {
            addr,
            len: data.len(),
        })?;
        slice.copy_from_slice(data);
        Ok(())
    }
}

impl GuestMemory for VecGuestMemory {
    fn read(&self, addr: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = checked_range(addr, dst.len())?;
        let mem = self.mem.borrow();
        let slice = mem.get(range).ok_or(GuestMemoryError {
            addr,
            len: dst.len(),
        })?;
        dst.copy_from_slice(slice);
        Ok(())
    }
}

fn checked_range(addr: u64, len: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
    let err = GuestMemoryError { addr, len };
    let start = usize::try_from(addr).map_err(|_| err.clone())?;
    let end = start.checked_add(len).ok_or(err)?;
    Ok(start..end)
}

use crate::guest_memory::GuestMemoryError;

/// Boxed error produced by a [`crate::ProgramBackend`] while compiling or linking.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ProgramCacheError {
    #[error(transparent)]
    GuestMemory(#[from] GuestMemoryError),

    #[error("vertex program length {words} words exceeds maximum {max} words")]
    VertexProgramTooLarge { words: usize, max: usize },

    #[error("fragment program at 0x{addr:x} has no end-of-program marker within {max} bytes")]
    UnterminatedFragmentProgram { addr: u64, max: usize },

    /// A vertex program was queried before it was ever resolved.
    #[error("vertex program with ucode hash 0x{ucode_hash:016x} was never resolved")]
    UnknownVertexProgram { ucode_hash: u64 },

    /// A fragment program was queried before it was ever resolved.
    #[error("fragment program at 0x{addr:x} (ucode hash 0x{ucode_hash:016x}) was never resolved")]
    UnknownFragmentProgram { addr: u64, ucode_hash: u64 },

    #[error("fragment constant buffer too small: need {needed} bytes, have {actual}")]
    ConstantBufferTooSmall { needed: usize, actual: usize },

    #[error("fragment constant at offset 0x{offset:x} overflows the address space (base 0x{addr:x})")]
    ConstantAddressOverflow { addr: u64, offset: u32 },

    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}

impl ProgramCacheError {
    pub(crate) fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

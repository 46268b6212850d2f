//! `aero-rsx-program-cache` caches translated RSX shader programs and linked pipelines.
//!
//! Translating guest ucode into host programs and linking those into pipeline objects is far
//! more expensive than a draw. This crate makes sure that:
//! - each distinct vertex or fragment ucode binary is compiled once (see
//!   [`VertexProgramCache`] / [`FragmentProgramCache`]);
//! - each distinct `(vertex program, fragment program, fixed-function state)` combination is
//!   linked once (see [`ProgramStateCache::get_or_build_pipeline`]);
//! - fragment inline constants can be re-read and byte-swapped for upload on every draw (see
//!   [`ProgramStateCache::fill_fragment_constants`]).
//!
//! Compilation and linking are delegated to a [`ProgramBackend`]; guest memory is read through
//! [`GuestMemory`].

pub mod backend;
pub mod binary;
pub mod config;
pub mod constants;
mod error;
pub mod guest_memory;
pub mod pipeline_cache;
pub mod stage_cache;
pub mod stats;
pub mod ucode;

pub use backend::{CompiledFragmentProgram, FragmentProgramSource, ProgramBackend};
pub use config::ProgramCacheConfig;
pub use error::{BackendError, ProgramCacheError};
pub use guest_memory::{GuestMemory, GuestMemoryError, VecGuestMemory};
pub use pipeline_cache::{PipelineKey, ProgramStateCache};
pub use stage_cache::{
    CacheLookupSource, CachedFragmentProgram, CachedVertexProgram, FragmentProgramCache,
    ProgramId, ProgramIdAllocator, ProgramLookup, VertexProgramCache,
};
pub use stats::ProgramCacheStats;

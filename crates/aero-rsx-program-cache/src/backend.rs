use std::hash::Hash;

use crate::error::ProgramCacheError;
use crate::guest_memory::GuestMemory;
use crate::stage_cache::{CachedFragmentProgram, CachedVertexProgram, ProgramId};
use crate::ucode;

/// Fragment ucode handed to the backend on a cache miss.
#[derive(Clone, Copy, Debug)]
pub struct FragmentProgramSource<'a> {
    /// Guest address the program was read from.
    pub addr: u64,
    /// The cache's own copy of the program, cut to its scanned length.
    pub ucode: &'a [u8],
}

/// What a backend produces for a fragment program.
#[derive(Debug)]
pub struct CompiledFragmentProgram<P> {
    pub program: P,
    /// Byte offsets (relative to the program start) of the inline constants the program reads,
    /// in the order they must be uploaded. [`ucode::constant_offsets`] computes this for plain
    /// RSX ucode.
    pub constant_offsets: Vec<u32>,
}

/// Host graphics backend that turns RSX ucode into executable programs and pipelines.
///
/// The cache guarantees that `compile_*` runs at most once per distinct ucode and
/// `build_pipeline` at most once per distinct `(vertex id, fragment id, properties)`.
pub trait ProgramBackend {
    type VertexProgram;
    type FragmentProgram;
    type Pipeline;
    /// Fixed-function state that affects pipeline compatibility (blend, depth, topology,
    /// vertex layout, ...). Compared structurally when looking up pipelines.
    type PipelineProperties: Clone + Eq + Hash;
    /// Extra per-build arguments (device handles, render pass info, ...).
    type BuildArgs: ?Sized;
    type Error: std::error::Error + Send + Sync + 'static;

    fn compile_vertex_program(
        &mut self,
        ucode: &[u32],
        id: ProgramId,
    ) -> Result<Self::VertexProgram, Self::Error>;

    fn compile_fragment_program(
        &mut self,
        source: FragmentProgramSource<'_>,
        id: ProgramId,
    ) -> Result<CompiledFragmentProgram<Self::FragmentProgram>, Self::Error>;

    fn build_pipeline(
        &mut self,
        vertex: &CachedVertexProgram<Self::VertexProgram>,
        fragment: &CachedFragmentProgram<Self::FragmentProgram>,
        properties: &Self::PipelineProperties,
        args: &Self::BuildArgs,
    ) -> Result<Self::Pipeline, Self::Error>;

    /// Length in bytes of the fragment program at `addr`.
    ///
    /// Defaults to the RSX end-of-program scan.
    fn fragment_ucode_size(
        &self,
        mem: &dyn GuestMemory,
        addr: u64,
        max_bytes: usize,
    ) -> Result<usize, ProgramCacheError> {
        ucode::fragment_ucode_size(mem, addr, max_bytes)
    }
}

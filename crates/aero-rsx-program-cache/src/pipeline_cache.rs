//! Program state cache: both stage stores plus the linked pipeline table.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use crate::backend::ProgramBackend;
use crate::config::ProgramCacheConfig;
use crate::constants;
use crate::error::ProgramCacheError;
use crate::guest_memory::GuestMemory;
use crate::stage_cache::{
    CacheLookupSource, CachedFragmentProgram, CachedVertexProgram, FragmentProgramCache,
    ProgramId, ProgramIdAllocator, ProgramLookup, VertexProgramCache,
};
use crate::stats::ProgramCacheStats;

/// Identity of a linked pipeline.
///
/// Compared field by field; two keys only match when both program ids and the full
/// fixed-function state are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey<P> {
    pub vertex_program_id: ProgramId,
    pub fragment_program_id: ProgramId,
    pub properties: P,
}

/// Content-addressed cache of RSX vertex programs, fragment programs and the pipelines linked
/// from them.
///
/// Entries are never evicted. All mutation goes through `&mut self`; callers that submit from
/// several threads must put the whole cache behind one lock, since a draw performs several
/// lookups and insertions that are only consistent as a unit.
pub struct ProgramStateCache<B: ProgramBackend> {
    backend: B,
    config: ProgramCacheConfig,
    ids: ProgramIdAllocator,
    vertex_programs: VertexProgramCache<B::VertexProgram>,
    fragment_programs: FragmentProgramCache<B::FragmentProgram>,
    pipelines: HashMap<PipelineKey<B::PipelineProperties>, B::Pipeline>,
    pipeline_hits: u64,
    pipeline_misses: u64,
}

impl<B: ProgramBackend> ProgramStateCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ProgramCacheConfig::default())
    }

    pub fn with_config(backend: B, config: ProgramCacheConfig) -> Self {
        Self {
            backend,
            config,
            ids: ProgramIdAllocator::new(),
            vertex_programs: VertexProgramCache::new(),
            fragment_programs: FragmentProgramCache::new(),
            pipelines: HashMap::new(),
            pipeline_hits: 0,
            pipeline_misses: 0,
        }
    }

    pub fn config(&self) -> ProgramCacheConfig {
        self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn vertex_programs(&self) -> &VertexProgramCache<B::VertexProgram> {
        &self.vertex_programs
    }

    pub fn fragment_programs(&self) -> &FragmentProgramCache<B::FragmentProgram> {
        &self.fragment_programs
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn stats(&self) -> ProgramCacheStats {
        ProgramCacheStats {
            vertex_program_hits: self.vertex_programs.hits(),
            vertex_program_misses: self.vertex_programs.misses(),
            vertex_programs: self.vertex_programs.len() as u64,
            fragment_program_hits: self.fragment_programs.hits(),
            fragment_program_misses: self.fragment_programs.misses(),
            fragment_programs: self.fragment_programs.len() as u64,
            pipeline_hits: self.pipeline_hits,
            pipeline_misses: self.pipeline_misses,
            pipelines: self.pipelines.len() as u64,
        }
    }

    /// Returns the cached vertex program for `ucode`, compiling it on first use.
    pub fn resolve_vertex_program(
        &mut self,
        ucode: &[u32],
    ) -> Result<ProgramLookup<'_, CachedVertexProgram<B::VertexProgram>>, ProgramCacheError> {
        let (index, source) = self.resolve_vertex_index(ucode)?;
        Ok(ProgramLookup::new(
            source,
            self.vertex_programs.program(index),
        ))
    }

    /// Returns the cached fragment program stored at `fp_addr`, compiling it on first use.
    pub fn resolve_fragment_program(
        &mut self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
    ) -> Result<ProgramLookup<'_, CachedFragmentProgram<B::FragmentProgram>>, ProgramCacheError>
    {
        let (index, source) = self.resolve_fragment_index(mem, fp_addr)?;
        Ok(ProgramLookup::new(
            source,
            self.fragment_programs.program(index),
        ))
    }

    /// Returns a vertex program that was previously resolved.
    pub fn vertex_program(
        &self,
        ucode: &[u32],
    ) -> Result<&CachedVertexProgram<B::VertexProgram>, ProgramCacheError> {
        self.vertex_programs.get(ucode)
    }

    /// Returns the fragment program at `fp_addr`, which must have been resolved before.
    pub fn fragment_program(
        &self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
    ) -> Result<&CachedFragmentProgram<B::FragmentProgram>, ProgramCacheError> {
        let ucode = self.read_fragment_ucode(mem, fp_addr)?;
        self.fragment_programs.get(fp_addr, &ucode)
    }

    /// Returns the pipeline for the given programs and fixed-function state, compiling
    /// programs and linking the pipeline as needed.
    pub fn get_or_build_pipeline(
        &mut self,
        mem: &dyn GuestMemory,
        vp_ucode: &[u32],
        fp_addr: u64,
        properties: &B::PipelineProperties,
        args: &B::BuildArgs,
    ) -> Result<&B::Pipeline, ProgramCacheError> {
        let (vp_index, vp_source) = self.resolve_vertex_index(vp_ucode)?;
        let (fp_index, fp_source) = self.resolve_fragment_index(mem, fp_addr)?;
        let both_cached =
            vp_source == CacheLookupSource::Memory && fp_source == CacheLookupSource::Memory;

        let vertex = self.vertex_programs.program(vp_index);
        let fragment = self.fragment_programs.program(fp_index);
        let key = PipelineKey {
            vertex_program_id: vertex.id,
            fragment_program_id: fragment.id,
            properties: properties.clone(),
        };

        match self.pipelines.entry(key) {
            Entry::Occupied(e) => {
                // A freshly compiled program has an id no stored key can contain yet.
                debug_assert!(both_cached, "new program id already present in a pipeline key");
                self.pipeline_hits += 1;
                trace!(
                    vp_id = %vertex.id,
                    fp_id = %fragment.id,
                    "pipeline cache hit"
                );
                Ok(e.into_mut())
            }
            Entry::Vacant(e) => {
                self.pipeline_misses += 1;
                debug!(
                    vp_id = %vertex.id,
                    fp_id = %fragment.id,
                    new_vp = vp_source == CacheLookupSource::Compiled,
                    new_fp = fp_source == CacheLookupSource::Compiled,
                    "building pipeline"
                );
                let pipeline = self
                    .backend
                    .build_pipeline(vertex, fragment, &e.key().properties, args)
                    .map_err(ProgramCacheError::backend)?;
                Ok(e.insert(pipeline))
            }
        }
    }

    /// Size in bytes of the constant buffer needed by the fragment program at `fp_addr`.
    ///
    /// Returns 0 when the program has not been resolved yet.
    pub fn fragment_constants_buffer_size(
        &self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
    ) -> Result<usize, ProgramCacheError> {
        let ucode = self.read_fragment_ucode(mem, fp_addr)?;
        match self.fragment_programs.lookup(&ucode) {
            Some(program) => Ok(program.constants_buffer_size()),
            None => {
                warn!(fp_addr, "constant buffer size requested for unresolved fragment program");
                Ok(0)
            }
        }
    }

    /// Copies the inline constants of the fragment program at `fp_addr` into `dst`, one
    /// 16-byte little-endian slot per constant.
    ///
    /// Constants are read from guest memory at `fp_addr`, not from the cached ucode copy.
    /// Does nothing if the program has not been resolved yet.
    pub fn fill_fragment_constants(
        &self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
        dst: &mut [u8],
    ) -> Result<(), ProgramCacheError> {
        let ucode = self.read_fragment_ucode(mem, fp_addr)?;
        let Some(program) = self.fragment_programs.lookup(&ucode) else {
            warn!(fp_addr, "constants requested for unresolved fragment program");
            return Ok(());
        };
        constants::fill_fragment_constants(mem, fp_addr, &program.constant_offsets, dst)
    }

    fn resolve_vertex_index(
        &mut self,
        ucode: &[u32],
    ) -> Result<(usize, CacheLookupSource), ProgramCacheError> {
        let max = self.config.max_vertex_program_words;
        if ucode.len() > max {
            return Err(ProgramCacheError::VertexProgramTooLarge {
                words: ucode.len(),
                max,
            });
        }

        let backend = &mut self.backend;
        self.vertex_programs
            .resolve_index(&mut self.ids, ucode, |ucode, id| {
                backend
                    .compile_vertex_program(ucode, id)
                    .map_err(ProgramCacheError::backend)
            })
    }

    fn resolve_fragment_index(
        &mut self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
    ) -> Result<(usize, CacheLookupSource), ProgramCacheError> {
        let ucode = self.read_fragment_ucode(mem, fp_addr)?;

        let backend = &mut self.backend;
        self.fragment_programs
            .resolve_index(&mut self.ids, fp_addr, ucode, |source, id| {
                backend
                    .compile_fragment_program(source, id)
                    .map_err(ProgramCacheError::backend)
            })
    }

    /// Copies the fragment program at `fp_addr` out of guest memory, cut to its scanned
    /// length.
    fn read_fragment_ucode(
        &self,
        mem: &dyn GuestMemory,
        fp_addr: u64,
    ) -> Result<Vec<u8>, ProgramCacheError> {
        let len =
            self.backend
                .fragment_ucode_size(mem, fp_addr, self.config.max_fragment_ucode_bytes)?;
        let mut ucode = vec![0u8; len];
        mem.read(fp_addr, &mut ucode)?;
        Ok(ucode)
    }
}

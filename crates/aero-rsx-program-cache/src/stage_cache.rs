//! Per-stage program stores.
//!
//! Each store maps ucode content to a compiled program record. Records live in a `Vec` and the
//! content index only stores positions, so a record's address in the store never matters for
//! identity and lookups can hand out plain indices to callers that need to borrow both stages
//! at once.

use std::fmt;
use std::ops::Deref;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::backend::{CompiledFragmentProgram, FragmentProgramSource};
use crate::binary::{FragmentUcodeKey, UcodeKey, UcodeRef, VertexUcodeKey};
use crate::error::ProgramCacheError;
use crate::ucode::CONSTANT_BYTES;

/// Identity assigned to a program when it is first inserted into a cache.
///
/// Ids are strictly increasing in insertion order and are never reused by the cache that
/// issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of program ids shared by the vertex and fragment stores of one cache.
#[derive(Debug, Default)]
pub struct ProgramIdAllocator {
    next: u64,
}

impl ProgramIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ProgramId {
        let id = ProgramId(self.next);
        self.next += 1;
        id
    }

    /// The id the next insertion will receive.
    pub fn peek(&self) -> ProgramId {
        ProgramId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupSource {
    /// The program was already present in the cache.
    Memory,
    /// The backend compiled the program and it was inserted into the cache.
    Compiled,
}

#[derive(Debug)]
pub struct ProgramLookup<'a, T> {
    pub source: CacheLookupSource,
    entry: &'a T,
}

impl<'a, T> ProgramLookup<'a, T> {
    pub(crate) fn new(source: CacheLookupSource, entry: &'a T) -> Self {
        Self { source, entry }
    }

    pub fn was_preexisting(&self) -> bool {
        self.source == CacheLookupSource::Memory
    }

    pub fn entry(&self) -> &'a T {
        self.entry
    }
}

impl<T> Deref for ProgramLookup<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.entry
    }
}

#[derive(Debug)]
pub struct CachedVertexProgram<P> {
    pub id: ProgramId,
    pub ucode_hash: u64,
    pub program: P,
}

#[derive(Debug)]
pub struct CachedFragmentProgram<P> {
    pub id: ProgramId,
    pub ucode_hash: u64,
    pub ucode_len: usize,
    pub constant_offsets: Vec<u32>,
    pub program: P,
}

impl<P> CachedFragmentProgram<P> {
    /// Bytes needed to upload every inline constant of this program.
    pub fn constants_buffer_size(&self) -> usize {
        self.constant_offsets.len() * CONSTANT_BYTES
    }
}

pub struct VertexProgramCache<P> {
    index: HashMap<VertexUcodeKey, usize>,
    programs: Vec<CachedVertexProgram<P>>,
    hits: u64,
    misses: u64,
}

impl<P> VertexProgramCache<P> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            programs: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the program for `ucode`, compiling and inserting it on a miss.
    pub fn resolve_or_compile<F>(
        &mut self,
        ids: &mut ProgramIdAllocator,
        ucode: &[u32],
        compile: F,
    ) -> Result<ProgramLookup<'_, CachedVertexProgram<P>>, ProgramCacheError>
    where
        F: FnOnce(&[u32], ProgramId) -> Result<P, ProgramCacheError>,
    {
        let (index, source) = self.resolve_index(ids, ucode, compile)?;
        Ok(ProgramLookup {
            source,
            entry: &self.programs[index],
        })
    }

    pub(crate) fn resolve_index<F>(
        &mut self,
        ids: &mut ProgramIdAllocator,
        ucode: &[u32],
        compile: F,
    ) -> Result<(usize, CacheLookupSource), ProgramCacheError>
    where
        F: FnOnce(&[u32], ProgramId) -> Result<P, ProgramCacheError>,
    {
        let probe = UcodeRef::vertex(ucode);
        if let Some(&index) = self.index.get(&probe) {
            self.hits += 1;
            trace!(program_id = %self.programs[index].id, "vertex program cache hit");
            return Ok((index, CacheLookupSource::Memory));
        }

        self.misses += 1;
        let id = ids.next_id();
        debug!(
            program_id = %id,
            ucode_hash = probe.digest(),
            words = ucode.len(),
            "vertex program not in cache, compiling"
        );
        let program = compile(ucode, id)?;

        let index = self.programs.len();
        self.programs.push(CachedVertexProgram {
            id,
            ucode_hash: probe.digest(),
            program,
        });
        self.index.insert(probe.to_key(), index);
        Ok((index, CacheLookupSource::Compiled))
    }

    pub fn lookup(&self, ucode: &[u32]) -> Option<&CachedVertexProgram<P>> {
        let index = *self.index.get(&UcodeRef::vertex(ucode))?;
        Some(&self.programs[index])
    }

    /// Returns the program for ucode that has already been resolved.
    ///
    /// Asking for ucode that was never resolved is a caller bug and is reported as
    /// [`ProgramCacheError::UnknownVertexProgram`].
    pub fn get(&self, ucode: &[u32]) -> Result<&CachedVertexProgram<P>, ProgramCacheError> {
        let probe = UcodeRef::vertex(ucode);
        match self.index.get(&probe) {
            Some(&index) => Ok(&self.programs[index]),
            None => Err(ProgramCacheError::UnknownVertexProgram {
                ucode_hash: probe.digest(),
            }),
        }
    }

    pub(crate) fn program(&self, index: usize) -> &CachedVertexProgram<P> {
        &self.programs[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedVertexProgram<P>> {
        self.programs.iter()
    }
}

impl<P> Default for VertexProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FragmentProgramCache<P> {
    index: HashMap<FragmentUcodeKey, usize>,
    programs: Vec<CachedFragmentProgram<P>>,
    hits: u64,
    misses: u64,
}

impl<P> FragmentProgramCache<P> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            programs: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the program for `ucode`, compiling and inserting it on a miss.
    ///
    /// `ucode` is the caller's copy of the guest program, already cut to its scanned length.
    /// On a miss that buffer becomes the cache's durable key, so nothing here keeps pointing
    /// into guest memory.
    pub fn resolve_or_compile<F>(
        &mut self,
        ids: &mut ProgramIdAllocator,
        addr: u64,
        ucode: Vec<u8>,
        compile: F,
    ) -> Result<ProgramLookup<'_, CachedFragmentProgram<P>>, ProgramCacheError>
    where
        F: FnOnce(
            FragmentProgramSource<'_>,
            ProgramId,
        ) -> Result<CompiledFragmentProgram<P>, ProgramCacheError>,
    {
        let (index, source) = self.resolve_index(ids, addr, ucode, compile)?;
        Ok(ProgramLookup {
            source,
            entry: &self.programs[index],
        })
    }

    pub(crate) fn resolve_index<F>(
        &mut self,
        ids: &mut ProgramIdAllocator,
        addr: u64,
        ucode: Vec<u8>,
        compile: F,
    ) -> Result<(usize, CacheLookupSource), ProgramCacheError>
    where
        F: FnOnce(
            FragmentProgramSource<'_>,
            ProgramId,
        ) -> Result<CompiledFragmentProgram<P>, ProgramCacheError>,
    {
        let probe = UcodeRef::fragment(&ucode);
        if let Some(&index) = self.index.get(&probe) {
            self.hits += 1;
            trace!(
                program_id = %self.programs[index].id,
                fp_addr = addr,
                "fragment program cache hit"
            );
            return Ok((index, CacheLookupSource::Memory));
        }
        let ucode_hash = probe.digest();

        self.misses += 1;
        let id = ids.next_id();
        debug!(
            program_id = %id,
            fp_addr = addr,
            ucode_hash,
            ucode_len = ucode.len(),
            "fragment program not in cache, compiling"
        );
        let compiled = compile(FragmentProgramSource { addr, ucode: &ucode }, id)?;

        let index = self.programs.len();
        self.programs.push(CachedFragmentProgram {
            id,
            ucode_hash,
            ucode_len: ucode.len(),
            constant_offsets: compiled.constant_offsets,
            program: compiled.program,
        });
        self.index
            .insert(UcodeKey::from_parts(ucode_hash, ucode), index);
        Ok((index, CacheLookupSource::Compiled))
    }

    pub fn lookup(&self, ucode: &[u8]) -> Option<&CachedFragmentProgram<P>> {
        let index = *self.index.get(&UcodeRef::fragment(ucode))?;
        Some(&self.programs[index])
    }

    /// Returns the program for ucode that has already been resolved.
    ///
    /// `addr` is only used to describe the failure when the ucode is unknown.
    pub fn get(
        &self,
        addr: u64,
        ucode: &[u8],
    ) -> Result<&CachedFragmentProgram<P>, ProgramCacheError> {
        let probe = UcodeRef::fragment(ucode);
        match self.index.get(&probe) {
            Some(&index) => Ok(&self.programs[index]),
            None => Err(ProgramCacheError::UnknownFragmentProgram {
                addr,
                ucode_hash: probe.digest(),
            }),
        }
    }

    pub(crate) fn program(&self, index: usize) -> &CachedFragmentProgram<P> {
        &self.programs[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedFragmentProgram<P>> {
        self.programs.iter()
    }
}

impl<P> Default for FragmentProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

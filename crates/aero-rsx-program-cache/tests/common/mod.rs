#![allow(dead_code)]

use std::fmt;

use aero_rsx_program_cache::{
    ucode, CachedFragmentProgram, CachedVertexProgram, CompiledFragmentProgram,
    FragmentProgramSource, ProgramBackend, ProgramId,
};

pub const CONST_SRC: u32 = 2 << 8;
pub const TEMP_SRC: u32 = 0;
const END_FLAG: u32 = 1 << 8;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// One 16-byte fragment instruction. `tag` lands in the opcode bits of dword 0 so programs can
/// be told apart.
pub fn fp_inst(tag: u32, end: bool, srcs: [u32; 3]) -> Vec<u8> {
    let word0 = (tag << 16) | if end { END_FLAG } else { 0 };
    [word0, srcs[0], srcs[1], srcs[2]]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// A constant slot as the guest stores it: four big-endian 32-bit lanes.
pub fn be_constant(values: [f32; 4]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| v.to_bits().to_be_bytes())
        .collect()
}

/// Single-instruction fragment program.
pub fn simple_fp(tag: u32) -> Vec<u8> {
    fp_inst(tag, true, [TEMP_SRC; 3])
}

/// `inst(reads constant) | constant | end inst`: 48 bytes, one constant at offset 16.
pub fn fp_with_constant(tag: u32, values: [f32; 4]) -> Vec<u8> {
    let mut ucode = fp_inst(tag, false, [TEMP_SRC, CONST_SRC, TEMP_SRC]);
    ucode.extend(be_constant(values));
    ucode.extend(fp_inst(tag, true, [TEMP_SRC; 3]));
    ucode
}

pub fn vp(tag: u32) -> Vec<u32> {
    vec![0x401f_9c6c, 0x0040_000d | tag, 0x8106_c083, 0x6041_ff80]
}

pub fn le_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedFunctionState {
    pub blend: bool,
    pub depth_test: bool,
    pub topology: Topology,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            blend: false,
            depth_test: true,
            topology: Topology::Triangles,
        }
    }
}

#[derive(Debug)]
pub struct TestVertexProgram {
    pub id: ProgramId,
    pub words: usize,
}

#[derive(Debug)]
pub struct TestFragmentProgram {
    pub id: ProgramId,
    pub compiled_from: u64,
    pub len: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestPipeline {
    pub serial: usize,
    pub vertex_program_id: ProgramId,
    pub fragment_program_id: ProgramId,
    pub state: FixedFunctionState,
    pub pass: String,
}

#[derive(Debug)]
pub struct BackendFailure(pub &'static str);

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend failure: {}", self.0)
    }
}

impl std::error::Error for BackendFailure {}

/// Backend that records every compile/link request instead of talking to a GPU.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub vertex_compiles: Vec<ProgramId>,
    pub fragment_compiles: Vec<(ProgramId, u64)>,
    pub pipeline_builds: Vec<(ProgramId, ProgramId)>,
    pub fail_next_compile: bool,
    pub fail_next_build: bool,
}

impl RecordingBackend {
    fn take_compile_failure(&mut self) -> Result<(), BackendFailure> {
        if std::mem::take(&mut self.fail_next_compile) {
            return Err(BackendFailure("compile"));
        }
        Ok(())
    }
}

impl ProgramBackend for RecordingBackend {
    type VertexProgram = TestVertexProgram;
    type FragmentProgram = TestFragmentProgram;
    type Pipeline = TestPipeline;
    type PipelineProperties = FixedFunctionState;
    /// Render pass label.
    type BuildArgs = str;
    type Error = BackendFailure;

    fn compile_vertex_program(
        &mut self,
        ucode: &[u32],
        id: ProgramId,
    ) -> Result<Self::VertexProgram, Self::Error> {
        self.take_compile_failure()?;
        self.vertex_compiles.push(id);
        Ok(TestVertexProgram {
            id,
            words: ucode.len(),
        })
    }

    fn compile_fragment_program(
        &mut self,
        source: FragmentProgramSource<'_>,
        id: ProgramId,
    ) -> Result<CompiledFragmentProgram<Self::FragmentProgram>, Self::Error> {
        self.take_compile_failure()?;
        self.fragment_compiles.push((id, source.addr));
        Ok(CompiledFragmentProgram {
            program: TestFragmentProgram {
                id,
                compiled_from: source.addr,
                len: source.ucode.len(),
            },
            constant_offsets: ucode::constant_offsets(source.ucode),
        })
    }

    fn build_pipeline(
        &mut self,
        vertex: &CachedVertexProgram<Self::VertexProgram>,
        fragment: &CachedFragmentProgram<Self::FragmentProgram>,
        properties: &Self::PipelineProperties,
        args: &Self::BuildArgs,
    ) -> Result<Self::Pipeline, Self::Error> {
        if std::mem::take(&mut self.fail_next_build) {
            return Err(BackendFailure("link"));
        }
        assert_eq!(vertex.id, vertex.program.id);
        assert_eq!(fragment.id, fragment.program.id);

        self.pipeline_builds.push((vertex.id, fragment.id));
        Ok(TestPipeline {
            serial: self.pipeline_builds.len(),
            vertex_program_id: vertex.id,
            fragment_program_id: fragment.id,
            state: *properties,
            pass: args.to_owned(),
        })
    }
}

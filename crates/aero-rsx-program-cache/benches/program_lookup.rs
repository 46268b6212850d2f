#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use std::convert::Infallible;

#[cfg(not(target_arch = "wasm32"))]
use aero_rsx_program_cache::{
    binary, ucode, CachedFragmentProgram, CachedVertexProgram, CompiledFragmentProgram,
    FragmentProgramSource, ProgramBackend, ProgramId, ProgramStateCache, VecGuestMemory,
};
#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[cfg(not(target_arch = "wasm32"))]
const FP_ADDR: u64 = 0x4000;

/// Backend whose "programs" are just the ids the cache assigned.
#[cfg(not(target_arch = "wasm32"))]
struct NullBackend;

#[cfg(not(target_arch = "wasm32"))]
impl ProgramBackend for NullBackend {
    type VertexProgram = ProgramId;
    type FragmentProgram = ProgramId;
    type Pipeline = (ProgramId, ProgramId);
    type PipelineProperties = u32;
    type BuildArgs = ();
    type Error = Infallible;

    fn compile_vertex_program(
        &mut self,
        _ucode: &[u32],
        id: ProgramId,
    ) -> Result<Self::VertexProgram, Self::Error> {
        Ok(id)
    }

    fn compile_fragment_program(
        &mut self,
        source: FragmentProgramSource<'_>,
        id: ProgramId,
    ) -> Result<CompiledFragmentProgram<Self::FragmentProgram>, Self::Error> {
        Ok(CompiledFragmentProgram {
            program: id,
            constant_offsets: ucode::constant_offsets(source.ucode),
        })
    }

    fn build_pipeline(
        &mut self,
        vertex: &CachedVertexProgram<Self::VertexProgram>,
        fragment: &CachedFragmentProgram<Self::FragmentProgram>,
        _properties: &Self::PipelineProperties,
        _args: &Self::BuildArgs,
    ) -> Result<Self::Pipeline, Self::Error> {
        Ok((vertex.id, fragment.id))
    }
}

/// A 512-instruction vertex program and a 64-instruction fragment program where every fourth
/// instruction carries an inline constant.
#[cfg(not(target_arch = "wasm32"))]
fn fixture() -> (Vec<u32>, VecGuestMemory) {
    let vp: Vec<u32> = (0..512 * 4u32).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();

    let mut fp = Vec::new();
    for i in 0..64u32 {
        let end = if i == 63 { 1 << 8 } else { 0 };
        let src0 = if i % 4 == 0 { 2 << 8 } else { 0 };
        for word in [(i << 16) | end, src0, 0, 0] {
            fp.extend_from_slice(&word.to_le_bytes());
        }
        if src0 != 0 {
            fp.extend_from_slice(&[0x3F, 0x80, 0, 0].repeat(4));
        }
    }

    let mem = VecGuestMemory::new(0x10000);
    mem.write(FP_ADDR, &fp).expect("fixture fits in guest memory");
    (vp, mem)
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_program_cache(c: &mut Criterion) {
    let (vp, mem) = fixture();
    let mut group = c.benchmark_group("rsx_program_cache");

    // Key computation alone (xxh3 over the raw ucode).
    group.bench_function("vertex_key", |b| {
        b.iter(|| black_box(binary::vertex_ucode_hash(black_box(&vp))))
    });

    group.bench_function("fragment_scan", |b| {
        b.iter(|| {
            let len = ucode::fragment_ucode_size(&mem, black_box(FP_ADDR), 64 * 1024).unwrap();
            black_box(len);
        })
    });

    // Draw-time fast path: both programs and the pipeline already cached.
    let mut cache = ProgramStateCache::new(NullBackend);
    cache
        .get_or_build_pipeline(&mem, &vp, FP_ADDR, &0, &())
        .expect("warm-up build");
    group.bench_function("pipeline_hit", |b| {
        b.iter(|| {
            let pipeline = cache
                .get_or_build_pipeline(&mem, black_box(&vp), black_box(FP_ADDR), &0, &())
                .unwrap();
            black_box(pipeline);
        })
    });

    let size = cache
        .fragment_constants_buffer_size(&mem, FP_ADDR)
        .expect("program resolved");
    let mut constants = vec![0u8; size];
    group.bench_function("fill_constants", |b| {
        b.iter(|| {
            cache
                .fill_fragment_constants(&mem, FP_ADDR, black_box(&mut constants))
                .unwrap();
        })
    });

    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_program_cache);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);

/// Snapshot of program/pipeline cache counters, suitable for profiling and telemetry.
///
/// A high miss count on a stage usually means a game is streaming many slightly different
/// programs (e.g. patched constants baked into vertex ucode) and is worth investigating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramCacheStats {
    pub vertex_program_hits: u64,
    pub vertex_program_misses: u64,
    pub vertex_programs: u64,

    pub fragment_program_hits: u64,
    pub fragment_program_misses: u64,
    pub fragment_programs: u64,

    pub pipeline_hits: u64,
    pub pipeline_misses: u64,
    pub pipelines: u64,
}

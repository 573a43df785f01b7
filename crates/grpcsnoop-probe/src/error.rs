use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read probe object file: {0}")]
    Io(#[source] std::io::Error),

    #[error("failed to load eBPF object: {0}")]
    Load(#[source] aya::EbpfError),

    #[error("program {0:?} not found in object file")]
    ProgramMissing(String),

    #[error("failed to load/attach kprobe program: {0}")]
    Program(#[source] aya::programs::ProgramError),

    #[error("perf buffer error: {0}")]
    PerfBuffer(#[source] aya::maps::perf::PerfBufferError),

    #[error("mio poll error: {0}")]
    Poll(#[source] std::io::Error),

    #[error("failed to enumerate online CPUs: {0}")]
    OnlineCpus(String),
}

//! Attaches the `unix_stream_sendmsg` kprobe and forwards the records it
//! captures into a bounded channel (spec.md §1, §4.1, §5).
//!
//! The BPF bytecode itself — the kprobe program, its per-CPU ring buffer
//! layout, the `__FILTER__`/`__SS_MAX_SEG_SIZE__` template substitution the
//! original implementation does at startup — is out of scope (spec.md §1,
//! "assumed to be produced by a separate, already-specified kernel-probe
//! component"). This crate is the real userspace half of that boundary: it
//! loads whatever compiled object file it's pointed at via `aya`, attaches
//! its kprobe, and drains its perf event array. Pointing it at a path with
//! no such object is a kernel-probe startup failure, which spec.md §7
//! already requires to be fatal — so failing cleanly here without a real
//! `.o` on disk is in-spec, not a gap.

mod error;
pub use error::ProbeError;

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::time::Duration;

use aya::maps::perf::{PerfEventArray, PerfEventArrayBuffer};
use aya::maps::MapData;
use aya::programs::KProbe;
use aya::{Ebpf, EbpfLoader};
use bytes::BytesMut;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

/// Matches the original implementation's Go channel capacity
/// (`channel := make(chan []byte, 1000)`, spec.md §5).
pub const CHANNEL_CAPACITY: usize = 1000;

const PER_CPU_PAGE_COUNT: usize = 64;
const READ_BUF_PER_CPU: usize = 16;
const READ_BUF_SIZE: usize = 1024 * 64;
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Owns the loaded eBPF object for as long as the probe needs to stay
/// attached; dropping it detaches the kprobe and closes the maps.
pub struct Probe {
    _ebpf: Ebpf,
}

impl Probe {
    /// Load `object_path`, attach its `probe_unix_stream_sendmsg` program
    /// to the kernel's `unix_stream_sendmsg`, and run the poll loop on the
    /// calling thread, forwarding each record onto `sender` until
    /// `shutdown` is set.
    pub fn attach_and_run(
        object_path: &str,
        sender: SyncSender<Vec<u8>>,
        shutdown: &AtomicBool,
    ) -> Result<(), ProbeError> {
        let bytes = std::fs::read(object_path).map_err(ProbeError::Io)?;
        let mut ebpf = EbpfLoader::new().load(&bytes).map_err(ProbeError::Load)?;

        let program: &mut KProbe = ebpf
            .program_mut("probe_unix_stream_sendmsg")
            .ok_or_else(|| ProbeError::ProgramMissing("probe_unix_stream_sendmsg".into()))?
            .try_into()
            .map_err(ProbeError::Program)?;
        program.load().map_err(ProbeError::Program)?;
        program
            .attach("unix_stream_sendmsg", 0)
            .map_err(ProbeError::Program)?;

        let map = ebpf
            .take_map("events")
            .ok_or_else(|| ProbeError::ProgramMissing("events".into()))?;
        let mut perf_array: PerfEventArray<MapData> =
            PerfEventArray::try_from(map).map_err(ProbeError::Load)?;

        let probe = Probe { _ebpf: ebpf };
        poll_all_cpus(&mut perf_array, sender, shutdown)?;
        drop(probe);
        Ok(())
    }
}

struct CpuBuffer {
    buf: PerfEventArrayBuffer<MapData>,
    token: Token,
}

/// Register one perf buffer per online CPU with `mio` and drain whichever
/// ones become readable, round-robin, until shutdown. Mirrors the shape of
/// the original's `bpf.InitPerfMap` + `perfMap.Start()/.Stop()` pair, but
/// cooperative rather than callback-driven (spec.md §5's shutdown
/// requirement: "allows the collaborator to close its ring buffer").
fn poll_all_cpus(
    perf_array: &mut PerfEventArray<MapData>,
    sender: SyncSender<Vec<u8>>,
    shutdown: &AtomicBool,
) -> Result<(), ProbeError> {
    let online_cpus = aya::util::online_cpus()
        .map_err(|(msg, e)| ProbeError::OnlineCpus(format!("{msg}: {e}")))?;

    let mut poll = Poll::new().map_err(ProbeError::Poll)?;
    let mut events = Events::with_capacity(online_cpus.len().max(1) * 2);
    let mut buffers = Vec::with_capacity(online_cpus.len());

    for (i, cpu_id) in online_cpus.into_iter().enumerate() {
        let buf = perf_array
            .open(cpu_id, Some(PER_CPU_PAGE_COUNT))
            .map_err(ProbeError::PerfBuffer)?;
        let token = Token(i);
        poll.registry()
            .register(&mut SourceFd(&buf.as_raw_fd()), token, Interest::READABLE)
            .map_err(ProbeError::Poll)?;
        buffers.push(CpuBuffer { buf, token });
    }

    let mut read_bufs: Vec<BytesMut> = (0..READ_BUF_PER_CPU)
        .map(|_| BytesMut::with_capacity(READ_BUF_SIZE))
        .collect();

    while !shutdown.load(Ordering::Relaxed) {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProbeError::Poll(e)),
        }

        for event in events.iter() {
            let Some(cpu) = buffers.iter_mut().find(|c| c.token == event.token()) else {
                continue;
            };
            let readable = cpu
                .buf
                .read_events(&mut read_bufs)
                .map_err(ProbeError::PerfBuffer)?;
            for buf in read_bufs.iter().take(readable.read) {
                // Best-effort: a full channel means the decoder fell
                // behind, which is an inherent possibility of a bounded
                // channel over a lossy ring buffer (spec.md §5); drop
                // rather than block the poll loop.
                let _ = sender.try_send(buf.to_vec());
            }
        }
    }
    Ok(())
}

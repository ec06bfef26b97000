//! Event timestamps and stage metrics
//!
//! All times are nanoseconds on the device clock. Throughput is reported in
//! bytes per nanosecond, which is numerically GB/s.

use crate::api::{ComputeApi, EventHandle, ProfilingInfo};
use crate::error::{Result, RuntimeError};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Host to device migration
    Load,
    /// Kernel launch
    Compute,
    /// Device to host migration
    Store,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Self; 3] = [Self::Load, Self::Compute, Self::Store];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Load => "load",
            Self::Compute => "compute",
            Self::Store => "store",
        })
    }
}

/// Read one profiling timestamp of an event.
///
/// # Errors
///
/// Returns `Api` if the API has no such timestamp.
pub fn profiling_timestamp<A: ComputeApi + ?Sized>(
    api: &A,
    event: EventHandle,
    info: ProfilingInfo,
) -> Result<u64> {
    api.profiling_info(event, info)
        .map_err(|s| RuntimeError::api("profiling_info", s))
}

/// The four profiling instants of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimestamps {
    /// Enqueued by the host
    pub queued: u64,
    /// Handed to the device
    pub submitted: u64,
    /// Began executing
    pub started: u64,
    /// Finished executing
    pub ended: u64,
}

impl StageTimestamps {
    /// Query all four instants of `event`.
    ///
    /// # Errors
    ///
    /// Returns `Api` if any timestamp is unavailable.
    pub fn query<A: ComputeApi + ?Sized>(api: &A, event: EventHandle) -> Result<Self> {
        let mut at = [0u64; 4];
        for (slot, info) in at.iter_mut().zip(ProfilingInfo::ALL) {
            *slot = profiling_timestamp(api, event, info)?;
        }
        let [queued, submitted, started, ended] = at;
        Ok(Self {
            queued,
            submitted,
            started,
            ended,
        })
    }

    /// Execution time, `ended - started`
    pub const fn elapsed_ns(&self) -> u64 {
        self.ended.saturating_sub(self.started)
    }
}

/// Execution time of an optional event; 0 when absent.
///
/// # Errors
///
/// Returns `Api` if a present event has no timestamps.
pub fn elapsed_ns<A: ComputeApi + ?Sized>(api: &A, event: Option<EventHandle>) -> Result<u64> {
    let Some(event) = event else {
        return Ok(0);
    };
    let started = profiling_timestamp(api, event, ProfilingInfo::Started)?;
    let ended = profiling_timestamp(api, event, ProfilingInfo::Ended)?;
    Ok(ended.saturating_sub(started))
}

/// Bytes per nanosecond; 0 when nothing was timed.
#[allow(clippy::cast_precision_loss)]
pub fn throughput(bytes: u64, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        0.0
    } else {
        bytes as f64 / elapsed_ns as f64
    }
}

/// Measurements of one stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMetrics {
    /// Stage
    pub stage: Stage,

    /// Bytes moved (0 for compute)
    pub bytes: u64,

    /// Timestamps, `None` when the stage was skipped
    pub timestamps: Option<StageTimestamps>,
}

impl StageMetrics {
    /// Execution time; 0 when skipped
    pub fn elapsed_ns(&self) -> u64 {
        self.timestamps.map_or(0, |t| t.elapsed_ns())
    }

    /// Bytes per nanosecond; 0 when skipped or for compute
    pub fn throughput(&self) -> f64 {
        throughput(self.bytes, self.elapsed_ns())
    }
}

/// Measurements of a full load/compute/store cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineMetrics {
    /// Host to device stage
    pub load: StageMetrics,
    /// Kernel stage
    pub compute: StageMetrics,
    /// Device to host stage
    pub store: StageMetrics,
}

impl PipelineMetrics {
    /// From first start to last end across the stages that ran
    pub fn span_ns(&self) -> u64 {
        let ran = || [self.load, self.compute, self.store].into_iter().filter_map(|m| m.timestamps);
        let start = ran().map(|t| t.started).min();
        let end = ran().map(|t| t.ended).max();
        match (start, end) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }
}

impl fmt::Display for PipelineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in [self.load, self.compute, self.store] {
            match m.timestamps {
                None => writeln!(f, "{:<8} skipped", m.stage)?,
                Some(_) if m.stage == Stage::Compute => {
                    writeln!(f, "{:<8} {:>10} ns", m.stage, m.elapsed_ns())?;
                }
                Some(_) => writeln!(
                    f,
                    "{:<8} {:>10} ns  {:>10} B  {:.3} GB/s",
                    m.stage,
                    m.elapsed_ns(),
                    m.bytes,
                    m.throughput()
                )?,
            }
        }
        write!(f, "{:<8} {:>10} ns", "total", self.span_ns())
    }
}

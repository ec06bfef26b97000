//! Load/compute/store execution pipeline
//!
//! ```text
//!          write            execute            read
//! Idle ───────────▶ Loaded ─────────▶ Computed ───────▶ Stored
//!  ▲                  ▲                                   │
//!  │ finish           └──────────── write ────────────────┤
//!  └──────────────────────────────────────────────────────┘
//! ```
//!
//! Stages are chained by events, never by blocking: compute waits on the
//! load event, store waits on the compute event. A stage whose buffer set is
//! empty is skipped and leaves no event; the next stage then has nothing to
//! wait on. Only [`Pipeline::finish`] blocks. It may be called at any point
//! of a cycle and only closes the cycle once the store stage is submitted.
//! Cycles submitted back to back without `finish` overlap on the device.
//!
//! The events of a cycle are held until the next `write`, which releases
//! them, so their timestamps stay readable in between.

use crate::api::{ComputeApi, EventHandle, KernelHandle, MigrationDirection, QueueHandle};
use crate::buffers::BufferManager;
use crate::error::{Result, RuntimeError};
use crate::profiling::{self, PipelineMetrics, Stage, StageMetrics, StageTimestamps};
use std::fmt;
use tracing::{debug, info, warn};

/// Position in the load/compute/store cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Nothing submitted since the last finish
    #[default]
    Idle,
    /// Load stage submitted
    Loaded,
    /// Compute stage submitted
    Computed,
    /// Store stage submitted
    Stored,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Computed => "computed",
            Self::Stored => "stored",
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StageRecord {
    event: Option<EventHandle>,
    bytes: u64,
}

/// Pipeline state and the most recent event of each stage
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    state: PipelineState,
    load: StageRecord,
    compute: StageRecord,
    store: StageRecord,
}

impl Pipeline {
    /// Idle pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    fn require(&self, operation: &str, allowed: &[PipelineState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RuntimeError::invalid_state(format!(
                "{operation} called while {}",
                self.state
            )))
        }
    }

    const fn record(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Load => &self.load,
            Stage::Compute => &self.compute,
            Stage::Store => &self.store,
        }
    }

    /// Submit the host to device migration of the load set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless idle or stored, `Api` if submission fails.
    pub fn write<A: ComputeApi + ?Sized>(
        &mut self,
        api: &mut A,
        queue: QueueHandle,
        buffers: &BufferManager,
    ) -> Result<Option<EventHandle>> {
        self.require("write", &[PipelineState::Idle, PipelineState::Stored])?;
        self.release_held(api)?;

        let handles = buffers.load_handles();
        let event = if handles.is_empty() {
            debug!("Load set empty, skipping load stage");
            None
        } else {
            let event = api
                .enqueue_migrate(queue, &handles, MigrationDirection::ToDevice, &[])
                .map_err(|s| RuntimeError::api("enqueue_migrate", s))?;
            info!("Load stage submitted: {} buffer(s)", handles.len());
            Some(event)
        };

        self.load = StageRecord {
            event,
            bytes: buffers.load_bytes(),
        };
        self.compute = StageRecord::default();
        self.store = StageRecord::default();
        self.state = PipelineState::Loaded;
        Ok(event)
    }

    /// Submit the kernel launch, after the load stage if it ran.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless loaded, `Api` if submission fails.
    pub fn execute<A: ComputeApi + ?Sized>(
        &mut self,
        api: &mut A,
        queue: QueueHandle,
        kernel: KernelHandle,
    ) -> Result<EventHandle> {
        self.require("execute", &[PipelineState::Loaded])?;

        let wait: Vec<EventHandle> = self.load.event.into_iter().collect();
        let event = api
            .enqueue_task(queue, kernel, &wait)
            .map_err(|s| RuntimeError::api("enqueue_task", s))?;
        info!("Compute stage submitted");

        self.compute = StageRecord {
            event: Some(event),
            bytes: 0,
        };
        self.state = PipelineState::Computed;
        Ok(event)
    }

    /// Submit the device to host migration of the store set, after compute.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless computed, `Api` if submission fails.
    pub fn read<A: ComputeApi + ?Sized>(
        &mut self,
        api: &mut A,
        queue: QueueHandle,
        buffers: &BufferManager,
    ) -> Result<Option<EventHandle>> {
        self.require("read", &[PipelineState::Computed])?;

        let handles = buffers.store_handles();
        let event = if handles.is_empty() {
            debug!("Store set empty, skipping store stage");
            None
        } else {
            let wait: Vec<EventHandle> = self.compute.event.into_iter().collect();
            let event = api
                .enqueue_migrate(queue, &handles, MigrationDirection::ToHost, &wait)
                .map_err(|s| RuntimeError::api("enqueue_migrate", s))?;
            info!("Store stage submitted: {} buffer(s)", handles.len());
            Some(event)
        };

        self.store = StageRecord {
            event,
            bytes: buffers.store_bytes(),
        };
        self.state = PipelineState::Stored;
        Ok(event)
    }

    /// Flush the queue and block until everything submitted has completed.
    ///
    /// A stored cycle becomes idle; any other state is kept so the cycle
    /// can continue.
    ///
    /// # Errors
    ///
    /// Returns `Api` if flush or finish fails.
    pub fn finish<A: ComputeApi + ?Sized>(&mut self, api: &mut A, queue: QueueHandle) -> Result<()> {
        api.flush(queue)
            .map_err(|s| RuntimeError::api("flush", s))?;
        api.finish(queue)
            .map_err(|s| RuntimeError::api("finish", s))?;
        if self.state == PipelineState::Stored {
            self.state = PipelineState::Idle;
        }
        debug!("Queue drained, pipeline {}", self.state);
        Ok(())
    }

    fn release_held<A: ComputeApi + ?Sized>(&mut self, api: &mut A) -> Result<()> {
        for record in [&mut self.load, &mut self.compute, &mut self.store] {
            if let Some(event) = record.event.take() {
                api.release_event(event)
                    .map_err(|s| RuntimeError::api("release_event", s))?;
            }
        }
        Ok(())
    }

    /// Release every event still held, logging failures.
    ///
    /// Timestamps of the last cycle are gone afterwards.
    pub fn release_events<A: ComputeApi + ?Sized>(&mut self, api: &mut A) {
        for record in [&mut self.load, &mut self.compute, &mut self.store] {
            if let Some(event) = record.event.take() {
                if let Err(s) = api.release_event(event) {
                    warn!("Failed to release event {}: {s}", event.id());
                }
            }
        }
    }

    /// Event of the latest submission of `stage`; `None` if skipped
    pub const fn event(&self, stage: Stage) -> Option<EventHandle> {
        self.record(stage).event
    }

    /// Bytes moved by the latest submission of `stage`
    pub const fn bytes(&self, stage: Stage) -> u64 {
        self.record(stage).bytes
    }

    /// Timestamps of `stage`; `None` if skipped
    ///
    /// # Errors
    ///
    /// Returns `Api` if the event has not completed or profiling is off.
    pub fn timestamps<A: ComputeApi + ?Sized>(
        &self,
        api: &A,
        stage: Stage,
    ) -> Result<Option<StageTimestamps>> {
        self.event(stage)
            .map(|event| StageTimestamps::query(api, event))
            .transpose()
    }

    /// Execution time of `stage`; 0 if skipped
    ///
    /// # Errors
    ///
    /// Same as [`Self::timestamps`].
    pub fn elapsed_ns<A: ComputeApi + ?Sized>(&self, api: &A, stage: Stage) -> Result<u64> {
        profiling::elapsed_ns(api, self.event(stage))
    }

    /// Bytes per nanosecond of `stage`; 0 if skipped and for compute
    ///
    /// # Errors
    ///
    /// Same as [`Self::timestamps`].
    pub fn throughput<A: ComputeApi + ?Sized>(&self, api: &A, stage: Stage) -> Result<f64> {
        Ok(profiling::throughput(
            self.bytes(stage),
            self.elapsed_ns(api, stage)?,
        ))
    }

    /// Metrics of all three stages
    ///
    /// # Errors
    ///
    /// Same as [`Self::timestamps`].
    pub fn metrics<A: ComputeApi + ?Sized>(&self, api: &A) -> Result<PipelineMetrics> {
        let measure = |stage: Stage| -> Result<StageMetrics> {
            Ok(StageMetrics {
                stage,
                bytes: self.bytes(stage),
                timestamps: self.timestamps(api, stage)?,
            })
        };
        Ok(PipelineMetrics {
            load: measure(Stage::Load)?,
            compute: measure(Stage::Compute)?,
            store: measure(Stage::Store)?,
        })
    }
}

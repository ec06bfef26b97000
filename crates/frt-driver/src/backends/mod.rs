//! Compute API implementations
//!
//! Only one ships in-tree:
//! - **Software**: in-process simulation with a deterministic clock (CI, tooling)
//!
//! Vendor runtimes plug in by implementing [`crate::ComputeApi`].

pub mod software;

pub use software::{KernelInvocation, SoftwareApi, SoftwareDevice};

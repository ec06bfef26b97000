//! Byte layout of the `xclbin2` accelerator container.
//!
//! This crate has **no dependencies** and **no I/O**. It is a pure model of
//! the container format: magic, fixed header offsets, section directory
//! records, the memory-topology and connectivity tables, mode codes, and the
//! vendor placement flags used when allocating buffers in a named bank.
//!
//! All multi-byte fields are little-endian. Offsets are absolute from the
//! start of the image unless stated otherwise.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`axlf`] | Magic, top-level struct offsets, header field offsets |
//! | [`section`] | Section directory record layout and section kind codes |
//! | [`topology`] | `mem_topology` / `connectivity` table layout |
//! | [`mode`] | Container mode codes (flat, PR, tandem, emulation) |
//! | [`bank`] | Bank tag → placement flag encoding (DDR banks, HBM channels) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod axlf;
pub mod bank;
pub mod mode;
pub mod section;
pub mod topology;

pub use mode::ContainerMode;
pub use section::SectionKind;

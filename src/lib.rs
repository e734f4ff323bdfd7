//! Device log reconstruction and cycle extraction.
//!
//! Device logs carry millisecond counters relative to an arbitrary boot, not
//! wall-clock time. This crate rebuilds a consistent absolute-time stream from
//! those counters, splits it into per-calendar-month files, and pairs
//! push/release events per switch channel into timed cycles.

pub mod classify;
pub mod config;
pub mod cycle;
pub mod reconstruct;
pub mod report;
pub mod segment;
pub mod stats;

//! burnrate-load — synthetic CPU load.
//!
//! Occupies one core with transcendental floating-point math until a
//! wall-clock deadline passes. The call is synchronous; async callers run
//! it on a blocking thread.
//!
//! # Duration resolution
//!
//! ```text
//! raw `ms` missing, unparsable, or < 1  →  default_ms
//! raw `ms` > max_ms                     →  max_ms
//! otherwise                             →  raw, clamped to [min_ms, max_ms]
//! ```

pub mod burner;

pub use burner::{BurnReport, burn, effective_ms};

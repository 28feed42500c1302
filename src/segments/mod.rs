//! Segment store and sweeper
//!
//! In segmented mode workers write a rolling manifest plus media segments
//! under `<base>/<session-key>/`. The store serves those files with byte
//! ranges; the sweeper deletes files older than the retention window,
//! whether or not their room is still live.

pub mod range;
pub mod store;
pub mod sweeper;

pub use range::{parse_range_header, RangeSpec};
pub use store::{content_type, is_manifest, SegmentStore};
pub use sweeper::{SweepReport, Sweeper};

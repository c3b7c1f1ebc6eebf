//! tether-relay: single-threaded readiness-driven stream shuffling
//!
//! One [`Shuffler`] owns any number of directional copy tasks plus
//! auxiliary watched descriptors and drives them all from a single
//! blocking poll(2) loop. No threads, no runtime: the only suspension
//! point is the poll call, and everything between two polls runs to
//! completion, so buffers and callbacks need no locking.

pub mod shuffler;

pub use shuffler::{shared, SharedBuffer, Shuffler, WatchControl};

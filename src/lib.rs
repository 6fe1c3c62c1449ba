//! ctxtail - live log tailing with grep-style context windows.
//!
//! [`tail`] turns a growing file into a stream of numbered lines, [`window`]
//! groups sequences into fixed-size sliding windows, and [`context`] builds
//! focus-line bundles from those windows.

pub mod config;
pub mod context;
pub mod display;
pub mod tail;
pub mod window;

//! Sliding window tests.

mod window_test;

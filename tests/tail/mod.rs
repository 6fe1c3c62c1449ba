//! Tailing tests.

mod tailer_test;

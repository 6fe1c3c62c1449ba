//! Context extraction tests.

mod extractor_test;

//! Integration tests for snapcrawl
//!
//! These drive the public API end to end: crawl runs over a real checkpoint
//! directory, merges across runs, and the HTTP adapters against wiremock.

mod common;
mod crawl_tests;
mod http_tests;
mod merge_tests;

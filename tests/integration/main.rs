//! Integration tests for the downloader and full vendor runs
//!
//! These tests use wiremock to create mock HTTP servers standing in for a
//! vendor storefront.

mod crawl_tests;
mod downloader_tests;

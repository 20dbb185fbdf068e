#![allow(dead_code)]

pub use previewd_test_utils::{eventually, fast_options, init_tracing, with_timeout};

use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;

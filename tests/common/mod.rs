#![allow(dead_code)]

pub mod backend;
pub mod vectors;

use std::time::Duration;

use index_loader::config::{LoaderOptions, RetryOptions};

/// Loader options with millisecond backoff so retry tests stay fast.
pub fn fast_options(max_retries: usize) -> LoaderOptions {
    LoaderOptions {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        retry: RetryOptions {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        },
    }
}

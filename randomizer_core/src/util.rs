use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

pub(crate) fn timeout<T>(timeout_ms: u64, f: impl Future<Output = Result<T>>) -> impl Future<Output = Result<T>> {
    use futures::FutureExt;
    tokio::time::timeout(Duration::from_millis(timeout_ms), f).map(move |result| {
        result.unwrap_or_else(|_| Err(Error::Timeout(format!("after {} ms", timeout_ms))))
    })
}

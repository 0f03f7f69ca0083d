// Retry with bounded exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

const MAX_BACKOFF_EXPONENT: u32 = 5;

pub async fn with_retry<F, Fut, T, E>(mut operation: F, max_retries: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(error);
                }

                let delay = Duration::from_secs(2u64.pow(attempt.min(MAX_BACKOFF_EXPONENT)));
                sleep(delay).await;
            }
        }
    }
}

//! Image acquisition with a fixed retry budget.

use std::time::Duration;

use crate::error::{ProvisionError, Result};
use crate::runtime::ContainerRuntime;

/// Pull `image`, retrying up to `attempts` times with `delay` between tries.
///
/// Returns the number of attempts it took.
pub async fn pull_with_retry(
    runtime: &dyn ContainerRuntime,
    image: &str,
    attempts: u32,
    delay: Duration,
) -> Result<u32> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        tracing::info!("Pulling image {} (attempt {}/{})", image, attempt, attempts);

        match runtime.pull_image(image).await {
            Ok(()) => {
                tracing::info!("Pulled image: {}", image);
                return Ok(attempt);
            }
            Err(e) => {
                tracing::warn!("Pull of {} failed: {}", image, e);
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ProvisionError::Pull {
        image: image.to_string(),
        attempts,
        reason: last_error,
    })
}

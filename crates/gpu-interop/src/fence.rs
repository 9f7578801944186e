//! Spin-wait on a GPU event fence.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::trace;

use crate::DeviceContext;

/// Poll `fence` until the GPU reports that every command recorded before its
/// end marker has executed.
///
/// This is a busy loop with a cooperative [`yield_now`](std::thread::yield_now)
/// between polls, run inline on the caller's thread. A poll error is returned
/// immediately. With `timeout` set, an unsignaled fence past the deadline is
/// an error; `None` waits for as long as it takes.
///
/// Returns the number of polls it took.
pub fn wait_for_fence<D: DeviceContext>(
    ctx: &D,
    fence: &D::Fence,
    timeout: Option<Duration>,
) -> Result<u32> {
    let start = Instant::now();
    let mut polls: u32 = 0;
    loop {
        polls = polls.saturating_add(1);
        if ctx.poll_fence(fence)? {
            trace!(polls, elapsed = ?start.elapsed(), "GPU fence signaled");
            return Ok(polls);
        }
        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                bail!("GPU fence not signaled after {limit:?} ({polls} polls)");
            }
        }
        std::thread::yield_now();
    }
}

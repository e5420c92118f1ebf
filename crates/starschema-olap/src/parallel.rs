use std::ops::Range;

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Crate-local pool for partitioned fact scans.
///
/// `None` when no pool could be built; callers then scan sequentially.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static SCAN_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_threads() -> usize {
    std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_pool() -> Option<ThreadPool> {
    let requested = desired_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("starschema-scan-{i}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(err) if requested > 1 => {
            log::warn!("failed to build a {requested}-thread scan pool ({err}); retrying with one");
            try_build(1).ok()
        }
        Err(err) => {
            log::warn!("failed to build scan pool ({err}); scanning sequentially");
            None
        }
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn scan_pool() -> Option<&'static ThreadPool> {
    SCAN_POOL.get_or_init(build_pool).as_ref()
}

/// Number of workers a partitioned scan may use. `1` when parallelism is unavailable.
pub(crate) fn available_workers() -> usize {
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if let Some(pool) = scan_pool() {
            return pool.current_num_threads().max(1);
        }
    }
    1
}

/// Split `0..rows` into at most `max_parts` contiguous ranges of at least `min_rows` rows each.
///
/// Inputs smaller than two partitions come back as a single range.
pub(crate) fn partition_rows(rows: usize, min_rows: usize, max_parts: usize) -> Vec<Range<usize>> {
    let parts = (rows / min_rows.max(1)).clamp(1, max_parts.max(1));
    let chunk = rows.div_ceil(parts).max(1);
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    while start < rows {
        let end = (start + chunk).min(rows);
        ranges.push(start..end);
        start = end;
    }
    if ranges.is_empty() {
        ranges.push(0..0);
    }
    ranges
}

/// Run `scan` over every range and return the results in range order.
///
/// Runs on the scan pool when there is more than one range and the pool exists, inline
/// otherwise.
pub(crate) fn map_partitions<T, F>(ranges: Vec<Range<usize>>, scan: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Send + Sync,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if ranges.len() > 1 {
            if let Some(pool) = scan_pool() {
                return pool.install(|| ranges.into_par_iter().map(&scan).collect());
            }
        }
    }
    ranges.into_iter().map(scan).collect()
}

//! Fan-out map over a fixed-size worker pool
//!
//! All per-image work (decode, convert, transform) goes through here. A pool
//! is built for each call and dropped when the call returns. Results always
//! come back in input order, whatever order the workers finished in.
//!
//! The first failing job fails the whole map: no partial results, no retry.

use rayon::prelude::*;

use crate::config::DEFAULT_POOL_SIZE;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelMap {
    pool_size: usize,
}

impl Default for ParallelMap {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl ParallelMap {
    /// A zero pool size is bumped to a single worker.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Call `f` once per input, one argument per call.
    pub fn map<T, R, F>(&self, f: F, inputs: Vec<T>) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync + Send,
    {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .thread_name(|i| format!("imageset-worker-{i}"))
            .build()?;

        log::debug!(
            "⚙️  Mapping {} jobs over {} workers",
            inputs.len(),
            self.pool_size
        );

        // Indexed collect keeps input order; collecting into Result stops at
        // the first error.
        pool.install(|| inputs.into_par_iter().map(|input| f(input)).collect())
    }

    /// Packed mode: each input is an argument tuple unpacked into the call.
    pub fn map_packed<A, B, R, F>(&self, f: F, inputs: Vec<(A, B)>) -> Result<Vec<R>>
    where
        A: Send,
        B: Send,
        R: Send,
        F: Fn(A, B) -> Result<R> + Sync + Send,
    {
        self.map(|(a, b)| f(a, b), inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slow_square(x: u64) -> Result<u64> {
        // Uneven job lengths so workers finish out of order
        std::thread::sleep(std::time::Duration::from_millis((x % 3) * 5));
        Ok(x * x)
    }

    #[test]
    fn test_matches_sequential_map() {
        let inputs: Vec<u64> = (0..50).collect();
        let expected: Vec<u64> = inputs.iter().map(|&x| x * x).collect();

        let result = ParallelMap::default().map(slow_square, inputs).unwrap();

        assert_eq!(result.len(), 50);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_packed_mode_unpacks_arguments() {
        let inputs = vec![
            ("a".to_string(), 1usize),
            ("bb".to_string(), 2),
            ("ccc".to_string(), 3),
        ];

        let result = ParallelMap::new(2)
            .map_packed(|s: String, n: usize| Ok(s.repeat(n)), inputs)
            .unwrap();

        assert_eq!(result, vec!["a", "bbbb", "ccccccccc"]);
    }

    #[test]
    fn test_failure_fails_whole_map() {
        let calls = AtomicUsize::new(0);
        let result: Result<Vec<u32>> = ParallelMap::new(4).map(
            |x: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                if x == 7 {
                    Err(StoreError::Task(format!("job {x} failed")))
                } else {
                    Ok(x)
                }
            },
            (0..20).collect(),
        );

        assert!(matches!(result, Err(StoreError::Task(_))));
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_empty_input() {
        let result: Vec<u8> = ParallelMap::default()
            .map(|x: u8| Ok(x), Vec::new())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_zero_pool_size_still_runs() {
        let map = ParallelMap::new(0);
        assert_eq!(map.pool_size(), 1);
        assert_eq!(map.map(|x: i32| Ok(x + 1), vec![1, 2]).unwrap(), vec![2, 3]);
    }
}

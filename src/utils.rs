//! Shared utilities.

/// Whether batch encoding may fan out across the rayon pool.
///
/// Components never manage thread pools themselves; callers configure the
/// pool and pass this flag through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }
}

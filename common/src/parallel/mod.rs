//! Parallel processing utilities.

use rayon::prelude::*;

#[cfg(test)]
mod tests;

/// Multiplier for number of chunks relative to CPU threads.
/// Using 3x threads provides good load balancing when some chunks finish faster.
const CHUNKS_PER_THREAD: usize = 3;

/// Compute a minimum per-task length that splits `len` items into roughly
/// `threads * CHUNKS_PER_THREAD` tasks. Never returns 0.
#[inline]
pub fn auto_chunk_size(len: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (len / num_chunks).max(1)
}

// ============================================================================
// Bucketed item lists
// ============================================================================

/// Item indices grouped by destination bucket.
///
/// Built with a stable counting sort: inside a bucket, indices keep the order
/// in which the items appeared in the source slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    /// `offsets[b]..offsets[b + 1]` is the range of `members` owned by bucket `b`.
    offsets: Vec<usize>,
    members: Vec<usize>,
}

impl Buckets {
    /// Groups `items` into `bucket_count` buckets using `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` returns a value `>= bucket_count`.
    pub fn group_by<T, K>(items: &[T], bucket_count: usize, key: K) -> Self
    where
        K: Fn(&T) -> usize,
    {
        let mut offsets = vec![0usize; bucket_count + 1];
        for item in items {
            let b = key(item);
            assert!(
                b < bucket_count,
                "bucket key {} out of range (bucket_count = {})",
                b,
                bucket_count
            );
            offsets[b + 1] += 1;
        }
        for b in 0..bucket_count {
            offsets[b + 1] += offsets[b];
        }

        let mut cursor = offsets[..bucket_count].to_vec();
        let mut members = vec![0usize; items.len()];
        for (idx, item) in items.iter().enumerate() {
            let b = key(item);
            members[cursor[b]] = idx;
            cursor[b] += 1;
        }

        Self { offsets, members }
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Item indices assigned to bucket `b`, in source order.
    #[inline]
    pub fn bucket(&self, b: usize) -> &[usize] {
        &self.members[self.offsets[b]..self.offsets[b + 1]]
    }

    /// Total number of grouped items.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of buckets that received at least one item.
    pub fn occupied(&self) -> usize {
        self.offsets.windows(2).filter(|w| w[1] > w[0]).count()
    }
}

/// Splits `data` into consecutive chunks of `chunk_len` (one per bucket) and
/// calls `f(bucket, chunk, members)` in parallel for every non-empty bucket.
///
/// Each chunk is handed to exactly one task, so `f` may mutate it freely.
///
/// # Panics
///
/// Panics if `data.len() != chunk_len * buckets.bucket_count()`.
pub fn par_for_each_bucket_mut<T, F>(data: &mut [T], chunk_len: usize, buckets: &Buckets, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T], &[usize]) + Sync + Send,
{
    assert_eq!(
        data.len(),
        chunk_len * buckets.bucket_count(),
        "data length must equal chunk_len * bucket_count"
    );
    if data.is_empty() || buckets.is_empty() {
        return;
    }

    data.par_chunks_mut(chunk_len)
        .enumerate()
        .for_each(|(b, chunk)| {
            let members = buckets.bucket(b);
            if !members.is_empty() {
                f(b, chunk, members);
            }
        });
}

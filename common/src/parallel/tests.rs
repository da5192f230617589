use super::*;

#[test]
fn test_auto_chunk_size_never_zero() {
    assert_eq!(auto_chunk_size(0), 1);
    assert_eq!(auto_chunk_size(1), 1);
    assert!(auto_chunk_size(1_000_000) >= 1);
}

#[test]
fn test_group_by_preserves_source_order() {
    let items = [3usize, 1, 3, 0, 1, 3];
    let buckets = Buckets::group_by(&items, 4, |&k| k);

    assert_eq!(buckets.bucket_count(), 4);
    assert_eq!(buckets.len(), 6);
    assert_eq!(buckets.bucket(0), &[3]);
    assert_eq!(buckets.bucket(1), &[1, 4]);
    assert!(buckets.bucket(2).is_empty());
    assert_eq!(buckets.bucket(3), &[0, 2, 5]);
    assert_eq!(buckets.occupied(), 3);
}

#[test]
fn test_group_by_empty() {
    let items: [usize; 0] = [];
    let buckets = Buckets::group_by(&items, 5, |&k| k);
    assert!(buckets.is_empty());
    assert_eq!(buckets.bucket_count(), 5);
    assert_eq!(buckets.occupied(), 0);
}

#[test]
#[should_panic(expected = "bucket key 4 out of range")]
fn test_group_by_panics_on_out_of_range_key() {
    Buckets::group_by(&[1usize, 4], 4, |&k| k);
}

#[test]
fn test_par_for_each_bucket_mut_writes_own_chunk() {
    // Items are (bucket, slot, value) triples.
    let items: Vec<(usize, usize, i64)> = vec![
        (2, 0, 5),
        (0, 1, 1),
        (2, 0, 7),
        (1, 2, -3),
        (0, 1, 2),
    ];
    let buckets = Buckets::group_by(&items, 3, |item| item.0);
    let mut data = vec![0i64; 3 * 3];

    par_for_each_bucket_mut(&mut data, 3, &buckets, |b, chunk, members| {
        for &m in members {
            let (bucket, slot, value) = items[m];
            assert_eq!(bucket, b);
            chunk[slot] += value;
        }
    });

    assert_eq!(data, vec![0, 3, 0, 0, 0, -3, 12, 0, 0]);
}

#[test]
fn test_par_for_each_bucket_mut_skips_empty_buckets() {
    let items = [1usize];
    let buckets = Buckets::group_by(&items, 4, |&k| k);
    let mut data = vec![0u32; 8];
    let visited = std::sync::atomic::AtomicUsize::new(0);

    par_for_each_bucket_mut(&mut data, 2, &buckets, |b, chunk, _| {
        visited.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        chunk.fill(b as u32 + 10);
    });

    assert_eq!(visited.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(data, vec![0, 0, 11, 11, 0, 0, 0, 0]);
}

#[test]
#[should_panic(expected = "data length must equal chunk_len * bucket_count")]
fn test_par_for_each_bucket_mut_length_mismatch_panics() {
    let buckets = Buckets::group_by(&[0usize], 2, |&k| k);
    let mut data = vec![0u8; 5];
    par_for_each_bucket_mut(&mut data, 2, &buckets, |_, _, _| {});
}

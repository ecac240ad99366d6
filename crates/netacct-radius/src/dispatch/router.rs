//! Affinity routing of requests onto worker lanes

/// Lane for `key` among `lanes`. Pure and stable across processes.
pub fn lane_for(key: &[u8], lanes: usize) -> usize {
    if lanes <= 1 {
        return 0;
    }
    let digest = blake3::hash(key);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(head) % lanes as u64) as usize
}

/// Two lanes per available core
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_lane() {
        assert_eq!(lane_for(b"anything", 1), 0);
        assert_eq!(lane_for(b"anything", 0), 0);
    }

    #[test]
    fn test_default_worker_count_is_even() {
        let workers = default_worker_count();
        assert!(workers >= 2);
        assert_eq!(workers % 2, 0);
    }

    proptest! {
        #[test]
        fn lane_is_in_range(
            key in proptest::collection::vec(any::<u8>(), 0..64),
            lanes in 1usize..256,
        ) {
            prop_assert!(lane_for(&key, lanes) < lanes);
        }

        #[test]
        fn lane_is_stable(
            key in proptest::collection::vec(any::<u8>(), 0..64),
            lanes in 1usize..256,
        ) {
            prop_assert_eq!(lane_for(&key, lanes), lane_for(&key.clone(), lanes));
        }
    }
}

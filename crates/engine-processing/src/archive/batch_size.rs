use model::strategy::FileBatchTiers;

/// Picks how many files the next batch takes.
///
/// Looks at the next `2 * base` file sizes, maps their mean onto the size
/// tiers and caps the result by what is left. Small files go in big batches;
/// large files in small ones so a tick stays within its time and memory.
pub fn next_batch_size(remaining_sizes: &[u64], base: usize, tiers: &FileBatchTiers) -> usize {
    if remaining_sizes.is_empty() {
        return 0;
    }
    let window = &remaining_sizes[..remaining_sizes.len().min(base.max(1) * 2)];
    let mean = window.iter().sum::<u64>() / window.len() as u64;

    let size = if mean < tiers.small_mean_bytes {
        tiers.small_batch
    } else if mean < tiers.large_mean_bytes {
        interpolate(
            mean,
            (tiers.small_mean_bytes, tiers.large_mean_bytes),
            tiers.medium_batch,
        )
    } else {
        interpolate(
            mean.min(tiers.huge_mean_bytes),
            (tiers.large_mean_bytes, tiers.huge_mean_bytes),
            tiers.large_batch,
        )
    };

    size.clamp(1, remaining_sizes.len())
}

/// Linear from `batch.1` at `range.0` down to `batch.0` at `range.1`.
fn interpolate(mean: u64, range: (u64, u64), batch: (usize, usize)) -> usize {
    let (lo, hi) = range;
    let (min, max) = batch;
    if hi <= lo {
        return min;
    }
    let t = (mean.saturating_sub(lo)) as f64 / (hi - lo) as f64;
    let size = max as f64 - t.clamp(0.0, 1.0) * (max - min) as f64;
    size.round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    fn tiers() -> FileBatchTiers {
        FileBatchTiers::default()
    }

    #[test]
    fn small_files_use_largest_batches() {
        let sizes = vec![10 * KB; 500];
        assert_eq!(next_batch_size(&sizes, 50, &tiers()), 100);
    }

    #[test]
    fn medium_and_large_tiers_shrink_with_size() {
        let medium_low = vec![100 * KB; 500];
        let medium_high = vec![4 * MB; 500];
        let large = vec![5 * MB; 500];
        let huge = vec![200 * MB; 500];

        assert_eq!(next_batch_size(&medium_low, 50, &tiers()), 75);
        let high = next_batch_size(&medium_high, 50, &tiers());
        assert!((25..=75).contains(&high) && high < 40, "{high}");
        assert_eq!(next_batch_size(&large, 50, &tiers()), 25);
        assert_eq!(next_batch_size(&huge, 50, &tiers()), 10);
    }

    #[test]
    fn capped_by_remaining_and_never_zero() {
        assert_eq!(next_batch_size(&[1, 2, 3], 50, &tiers()), 3);
        assert_eq!(next_batch_size(&[200 * MB], 1, &tiers()), 1);
        assert_eq!(next_batch_size(&[], 50, &tiers()), 0);
    }

    #[test]
    fn only_the_lookahead_window_counts() {
        // 4 tiny files ahead of many huge ones: base 2 looks at 4 files only
        let mut sizes = vec![KB; 4];
        sizes.extend(vec![500 * MB; 100]);
        assert_eq!(next_batch_size(&sizes, 2, &tiers()), 100);
    }

    #[test]
    fn cursor_reaches_total_exactly_once() {
        let sizes: Vec<u64> = (0..1234).map(|i| (i % 7) * MB + 3 * KB).collect();
        let mut cursor = 0;
        let mut ticks = 0;
        while cursor < sizes.len() {
            let n = next_batch_size(&sizes[cursor..], 50, &tiers());
            assert!(n >= 1);
            cursor += n;
            ticks += 1;
            assert!(cursor <= sizes.len());
        }
        assert_eq!(cursor, sizes.len());
        assert!(ticks > 1);
    }
}

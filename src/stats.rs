// SIMD mean / standard deviation used when fitting the normalizers.

use wide::f64x4;

pub struct SimdStats;

impl SimdStats {
    /// Mean using 4-lane SIMD accumulation.
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let chunks = values.chunks_exact(4);
        let remainder = chunks.remainder();

        let mut sum = f64x4::splat(0.0);
        for chunk in chunks {
            sum += f64x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let simd_sum: f64 = sum.to_array().iter().sum();
        let remaining_sum: f64 = remainder.iter().sum();
        (simd_sum + remaining_sum) / values.len() as f64
    }

    /// Population standard deviation around a precomputed mean.
    pub fn std_dev(values: &[f64], mean: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let chunks = values.chunks_exact(4);
        let remainder = chunks.remainder();

        let mean_vec = f64x4::splat(mean);
        let mut sum_sq_diff = f64x4::splat(0.0);
        for chunk in chunks {
            let diff = f64x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]) - mean_vec;
            sum_sq_diff += diff * diff;
        }

        let simd_variance: f64 = sum_sq_diff.to_array().iter().sum();
        let remaining_variance: f64 = remainder.iter().map(|x| (x - mean) * (x - mean)).sum();
        ((simd_variance + remaining_variance) / values.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simd_mean_matches_scalar() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let regular_mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((SimdStats::mean(&values) - regular_mean).abs() < 1e-12);
    }

    #[test]
    fn test_simd_std_dev_matches_scalar() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mean = SimdStats::mean(&values);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((SimdStats::std_dev(&values, mean) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_and_empty_inputs() {
        assert_eq!(SimdStats::mean(&[]), 0.0);
        assert_eq!(SimdStats::std_dev(&[], 0.0), 0.0);
        assert_eq!(SimdStats::mean(&[3.0]), 3.0);
        assert_eq!(SimdStats::std_dev(&[3.0, 3.0, 3.0], 3.0), 0.0);
    }
}

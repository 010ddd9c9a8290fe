/// Combining prefilter and BM25 scores into one lexical ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

/// One document's scores across both lexical stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    /// Corpus position
    pub position: usize,
    /// TF-IDF prefilter score
    pub stage1: f64,
    /// BM25 score
    pub stage2: f64,
    /// Geometric mean of the stage scores
    pub fused: f64,
}

/// n-ary geometric mean; 0.0 for an empty slice.
pub fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let product: f64 = values.iter().product();
    product.powf(1.0 / values.len() as f64)
}

/// Round to three decimals from the exact binary value; 1.0005 rounds down.
fn deadband(x: f64) -> f64 {
    format!("{:.3}", x).parse().unwrap_or(x)
}

/// Ordering on (fused, stage2, stage1) after 3-decimal rounding, all descending.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    deadband(b.fused)
        .total_cmp(&deadband(a.fused))
        .then_with(|| deadband(b.stage2).total_cmp(&deadband(a.stage2)))
        .then_with(|| deadband(b.stage1).total_cmp(&deadband(a.stage1)))
}

/// Fuse BM25 results with the prefilter scores they were restricted to.
///
/// Every `stage2` position must have a `stage1` score; positions without one are
/// dropped. Ties after rounding keep `stage2` order.
pub fn fuse_stages(stage1: &[(usize, f64)], stage2: &[(usize, f64)]) -> Vec<ScoredCandidate> {
    let stage1_by_position: HashMap<usize, f64> = stage1.iter().copied().collect();

    let mut candidates: Vec<ScoredCandidate> = stage2
        .iter()
        .filter_map(|&(position, s2)| {
            let s1 = *stage1_by_position.get(&position)?;
            Some(ScoredCandidate {
                position,
                stage1: s1,
                stage2: s2,
                fused: geometric_mean(&[s2, s1]),
            })
        })
        .collect();

    candidates.sort_by(rank_order);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_mean_basics() {
        assert!((geometric_mean(&[4.0, 9.0]) - 6.0).abs() < 1e-12);
        assert!((geometric_mean(&[2.0, 4.0, 8.0]) - 4.0).abs() < 1e-12);
        assert_eq!(geometric_mean(&[]), 0.0);
    }

    #[test]
    fn test_geometric_mean_symmetric() {
        for &(a, b) in &[(0.1, 3.0), (2.5, 2.5), (1e-4, 17.0)] {
            assert_eq!(geometric_mean(&[a, b]), geometric_mean(&[b, a]));
        }
    }

    #[test]
    fn test_geometric_mean_strictly_increasing() {
        let fixed = 0.7;
        let mut previous = geometric_mean(&[0.01, fixed]);
        for step in 1..50 {
            let x = 0.01 + step as f64 * 0.3;
            let current = geometric_mean(&[x, fixed]);
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_fuse_orders_by_fused_score() {
        let stage1 = vec![(0, 0.5), (1, 0.1), (2, 0.9)];
        let stage2 = vec![(1, 4.0), (0, 3.0), (2, 2.0)];
        let fused = fuse_stages(&stage1, &stage2);
        let order: Vec<usize> = fused.iter().map(|c| c.position).collect();
        // sqrt(1.5)=1.22, sqrt(0.4)=0.63, sqrt(1.8)=1.34
        assert_eq!(order, vec![2, 0, 1]);
        assert!((fused[0].fused - 1.8f64.sqrt()).abs() < 1e-12);
        assert_eq!(fused[0].stage1, 0.9);
        assert_eq!(fused[0].stage2, 2.0);
    }

    #[test]
    fn test_fuse_deadband_falls_back_to_stage2() {
        // fused scores equal to three decimals, stage2 decides
        let stage1 = vec![(0, 1.0), (1, 4.0)];
        let stage2 = vec![(0, 4.0), (1, 1.0)];
        let fused = fuse_stages(&stage1, &stage2);
        assert_eq!(fused[0].position, 0);
        assert_eq!(fused[1].position, 1);
    }

    #[test]
    fn test_fuse_full_ties_keep_stage2_order() {
        let stage1 = vec![(3, 1.0), (5, 1.0)];
        let stage2 = vec![(5, 2.0), (3, 2.0)];
        let fused = fuse_stages(&stage1, &stage2);
        assert_eq!(fused[0].position, 5);
        assert_eq!(fused[1].position, 3);
    }

    #[test]
    fn test_deadband_rounds_exact_value() {
        assert_eq!(deadband(1.0005), 1.0);
        assert_eq!(deadband(1.0008), 1.001);
        assert_eq!(deadband(2.0004), 2.0);
        assert_eq!(deadband(0.0), 0.0);
    }

    #[test]
    fn test_deadband_boundary_defers_to_stage2() {
        let candidate = |position, fused, stage2| ScoredCandidate {
            position,
            stage1: 1.0,
            stage2,
            fused,
        };
        // both fused scores round to 1.000, so the larger stage2 wins
        let mut candidates = vec![candidate(0, 1.0005, 1.0), candidate(1, 1.0002, 2.0)];
        candidates.sort_by(rank_order);
        let order: Vec<usize> = candidates.iter().map(|c| c.position).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_fuse_drops_positions_without_stage1() {
        let fused = fuse_stages(&[(0, 1.0)], &[(0, 1.0), (9, 5.0)]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].position, 0);
        assert!(fuse_stages(&[], &[]).is_empty());
    }
}

use crate::lapjv::lapjv;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_lapjv_3x3() {
    let n = 3;
    let cost = vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ];
    let mut x = vec![-1; 3];
    let mut y = vec![-1; 3];
    let n_free_rows = lapjv(n, &cost, &mut x, &mut y);
    assert_eq!(n_free_rows, 0);
    assert_eq!(x, vec![2, 0, 1]);
    assert_eq!(y, vec![1, 2, 0]);
}

#[test]
fn test_lapjv_4x4() {
    let n = 4;
    let cost = vec![
        vec![1., 2., 3., 4.],
        vec![5., 6., 7., 8.],
        vec![9., 10., 11., 12.],
        vec![13., 14., 15., 16.],
    ];
    let mut x = vec![-1; 4];
    let mut y = vec![-1; 4];
    let n_free_rows = lapjv(n, &cost, &mut x, &mut y);
    assert_eq!(n_free_rows, 0);
    let total: f64 = (0..n).map(|i| cost[i][x[i] as usize]).sum();
    assert_eq!(total, 34.0);
    for (j, &yj) in y.iter().enumerate() {
        assert_eq!(x[yj as usize], j as isize);
    }
}

#[test]
fn test_lapjv_distinct_optimum() {
    let n = 3;
    let cost = vec![
        vec![10.0, 2.0, 8.0],
        vec![1.0, 9.0, 7.0],
        vec![6.0, 5.0, 3.0],
    ];
    let mut x = vec![-1; 3];
    let mut y = vec![-1; 3];
    let n_free_rows = lapjv(n, &cost, &mut x, &mut y);
    assert_eq!(n_free_rows, 0);
    // Unique optimum: 2 + 1 + 3.
    assert_eq!(x, vec![1, 0, 2]);
    assert_eq!(y, vec![1, 0, 2]);
}

/// Minimum assignment cost by exhaustive permutation search.
fn brute_force_optimum(n: usize, cost: &[Vec<f64>]) -> f64 {
    fn recurse(
        row: usize,
        n: usize,
        cost: &[Vec<f64>],
        used: &mut [bool],
        acc: f64,
        best: &mut f64,
    ) {
        if row == n {
            if acc < *best {
                *best = acc;
            }
            return;
        }
        if acc >= *best {
            return;
        }
        for j in 0..n {
            if !used[j] {
                used[j] = true;
                recurse(row + 1, n, cost, used, acc + cost[row][j], best);
                used[j] = false;
            }
        }
    }

    let mut best = f64::INFINITY;
    let mut used = vec![false; n];
    recurse(0, n, cost, &mut used, 0.0, &mut best);
    best
}

#[test]
fn test_lapjv_matches_brute_force() {
    for seed in 0..1000u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = rng.gen_range(2..=8);
        let cost: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..n).map(|_| rng.gen::<f64>()).collect())
            .collect();

        let mut x = vec![-1isize; n];
        let mut y = vec![-1isize; n];
        let n_free_rows = lapjv(n, &cost, &mut x, &mut y);
        assert_eq!(n_free_rows, 0, "seed {} left free rows", seed);

        // A valid permutation ...
        let mut seen = vec![false; n];
        for &xi in &x {
            assert!(xi >= 0 && (xi as usize) < n);
            assert!(!seen[xi as usize], "seed {} duplicated a column", seed);
            seen[xi as usize] = true;
        }

        // ... with the globally optimal total.
        let total: f64 = (0..n).map(|i| cost[i][x[i] as usize]).sum();
        let expected = brute_force_optimum(n, &cost);
        assert!(
            (total - expected).abs() < 1e-9,
            "seed {}: lapjv total {} vs brute force {}",
            seed,
            total,
            expected
        );
    }
}

use nalgebra::DMatrix;

/*-----------------------------------------------------------------------------
lapjv.rs - Jonker-Volgenant linear assignment algorithm
-----------------------------------------------------------------------------*/

const LARGE: f64 = 1e9;
const GATED: f64 = 1e6;

/// Result of one gated assignment round: matched (track, detection) index
/// pairs plus the leftovers on both sides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationData {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_track_indices: Vec<usize>,
    pub unmatched_det_indices: Vec<usize>,
}

/// Column reduction with reduction transfer. Initializes the dual prices `v`
/// and the partial assignment `x`/`y`, returns the number of unassigned rows
/// written to the front of `free_rows`.
fn ccrt_dense(
    n: usize,
    cost: &[Vec<f64>],
    free_rows: &mut [usize],
    x: &mut [isize],
    y: &mut [isize],
    v: &mut [f64],
) -> usize {
    for i in 0..n {
        x[i] = -1;
        v[i] = LARGE;
        y[i] = 0;
    }
    for i in 0..n {
        for j in 0..n {
            let c = cost[i][j];
            if c < v[j] {
                v[j] = c;
                y[j] = i as isize;
            }
        }
    }

    let mut unique = vec![true; n];
    let mut j = n;
    while j > 0 {
        j -= 1;
        let i = y[j] as usize;
        if x[i] < 0 {
            x[i] = j as isize;
        } else {
            unique[i] = false;
            y[j] = -1;
        }
    }

    let mut n_free_rows = 0;
    for i in 0..n {
        if x[i] < 0 {
            free_rows[n_free_rows] = i;
            n_free_rows += 1;
        } else if unique[i] {
            let j = x[i] as usize;
            let mut min = LARGE;
            for j2 in 0..n {
                if j2 == j {
                    continue;
                }
                let c = cost[i][j2] - v[j2];
                if c < min {
                    min = c;
                }
            }
            v[j] -= min;
        }
    }
    n_free_rows
}

/// Augmenting row reduction: alternate between the two cheapest columns of
/// each free row, bumping out previous assignments while the dual price of
/// the cheapest column still lowers.
fn carr_dense(
    n: usize,
    cost: &[Vec<f64>],
    n_free_rows: usize,
    free_rows: &mut [usize],
    x: &mut [isize],
    y: &mut [isize],
    v: &mut [f64],
) -> usize {
    let mut current = 0;
    let mut new_free_rows = 0;
    let mut rr_cnt = 0;

    while current < n_free_rows {
        rr_cnt += 1;
        let free_i = free_rows[current];
        current += 1;

        let mut j1: isize = 0;
        let mut j2: isize = -1;
        let mut v1 = cost[free_i][0] - v[0];
        let mut v2 = LARGE;

        for j in 1..n {
            let c = cost[free_i][j] - v[j];
            if c < v2 {
                if c >= v1 {
                    v2 = c;
                    j2 = j as isize;
                } else {
                    v2 = v1;
                    v1 = c;
                    j2 = j1;
                    j1 = j as isize;
                }
            }
        }

        let mut i0 = y[j1 as usize];
        let v1_new = v[j1 as usize] - (v2 - v1);
        let v1_lowers = v1_new < v[j1 as usize];

        if rr_cnt < current * n {
            if v1_lowers {
                v[j1 as usize] = v1_new;
            } else if i0 >= 0 && j2 >= 0 {
                j1 = j2;
                i0 = y[j1 as usize];
            }

            if i0 >= 0 {
                if v1_lowers {
                    current -= 1;
                    free_rows[current] = i0 as usize;
                } else {
                    free_rows[new_free_rows] = i0 as usize;
                    new_free_rows += 1;
                }
            }
        } else if i0 >= 0 {
            free_rows[new_free_rows] = i0 as usize;
            new_free_rows += 1;
        }
        x[free_i] = j1;
        y[j1 as usize] = free_i as isize;
    }
    new_free_rows
}

/// Move the columns of `cols[lo..]` with the minimum `d` to the front of the
/// todo range and return the new `hi` bound.
fn find_dense(n: usize, lo: usize, d: &[f64], cols: &mut [usize]) -> usize {
    let mut hi = lo + 1;
    let mut mind = d[cols[lo]];
    for k in hi..n {
        let j = cols[k];
        if d[j] <= mind {
            if d[j] < mind {
                hi = lo;
                mind = d[j];
            }
            cols[k] = cols[hi];
            cols[hi] = j;
            hi += 1;
        }
    }
    hi
}

/// Scan the ready columns, relaxing path costs of the remaining ones.
/// Returns an unassigned column hit at the current minimum, or -1.
#[allow(clippy::too_many_arguments)]
fn scan_dense(
    n: usize,
    cost: &[Vec<f64>],
    lo: &mut usize,
    hi: &mut usize,
    d: &mut [f64],
    cols: &mut [usize],
    pred: &mut [isize],
    y: &[isize],
    v: &[f64],
) -> isize {
    while *lo != *hi {
        let j = cols[*lo];
        *lo += 1;
        let i = y[j] as usize;
        let mind = d[j];
        let h = cost[i][j] - v[j] - mind;

        for k in *hi..n {
            let j2 = cols[k];
            let cred_ij = cost[i][j2] - v[j2] - h;
            if cred_ij < d[j2] {
                d[j2] = cred_ij;
                pred[j2] = i as isize;
                if cred_ij == mind {
                    if y[j2] < 0 {
                        return j2 as isize;
                    }
                    cols[k] = cols[*hi];
                    cols[*hi] = j2;
                    *hi += 1;
                }
            }
        }
    }
    -1
}

/// Single iteration of Dijkstra-style shortest augmenting path search,
/// starting from row `start_i`. Returns the closest unassigned column and
/// updates the dual prices of all columns that became ready on the way.
fn find_path_dense(
    n: usize,
    cost: &[Vec<f64>],
    start_i: usize,
    y: &[isize],
    v: &mut [f64],
    pred: &mut [isize],
) -> isize {
    let mut lo = 0usize;
    let mut hi = 0usize;
    let mut n_ready = 0usize;

    let mut cols: Vec<usize> = (0..n).collect();
    let mut d = vec![0.0f64; n];
    for j in 0..n {
        pred[j] = start_i as isize;
        d[j] = cost[start_i][j] - v[j];
    }

    let mut final_j: isize = -1;
    while final_j == -1 {
        if lo == hi {
            n_ready = lo;
            hi = find_dense(n, lo, &d, &mut cols);
            for k in lo..hi {
                let j = cols[k];
                if y[j] < 0 {
                    final_j = j as isize;
                }
            }
        }
        if final_j == -1 {
            final_j =
                scan_dense(n, cost, &mut lo, &mut hi, &mut d, &mut cols, pred, y, v);
        }
    }

    let mind = d[cols[lo]];
    for &j in cols.iter().take(n_ready) {
        v[j] += d[j] - mind;
    }
    final_j
}

/// Augment the assignment for every remaining free row via shortest
/// augmenting paths.
fn ca_dense(
    n: usize,
    cost: &[Vec<f64>],
    n_free_rows: usize,
    free_rows: &[usize],
    x: &mut [isize],
    y: &mut [isize],
    v: &mut [f64],
) -> usize {
    let mut pred = vec![-1isize; n];

    for &free_i in free_rows.iter().take(n_free_rows) {
        let mut j = find_path_dense(n, cost, free_i, y, v, &mut pred);
        debug_assert!(j >= 0, "augmenting path must end in a free column");

        // Walk the path backwards, flipping assignments.
        let mut i: isize = -1;
        let mut steps = 0;
        while i != free_i as isize {
            i = pred[j as usize];
            y[j as usize] = i;
            std::mem::swap(&mut x[i as usize], &mut j);
            steps += 1;
            if steps > n {
                return n_free_rows;
            }
        }
    }
    0
}

/// Solve the square `n x n` assignment problem, minimizing total cost.
/// `x[i]` receives the column of row `i`, `y[j]` the row of column `j`.
/// Returns the number of rows left unassigned (0 on success).
pub fn lapjv(
    n: usize,
    cost: &[Vec<f64>],
    x: &mut [isize],
    y: &mut [isize],
) -> usize {
    assert!(n > 0, "n must be greater than 0");
    debug_assert!(cost.len() == n && cost[0].len() == n);
    debug_assert!(x.len() == n && y.len() == n);

    let mut free_rows = vec![0usize; n];
    let mut v = vec![0.0f64; n];

    let mut ret = ccrt_dense(n, cost, &mut free_rows, x, y, &mut v);
    let mut i = 0;
    while ret > 0 && i < 2 {
        ret = carr_dense(n, cost, ret, &mut free_rows, x, y, &mut v);
        i += 1;
    }
    if ret > 0 {
        ret = ca_dense(n, cost, ret, &free_rows, x, y, &mut v);
    }
    ret
}

/// Gated assignment on a possibly rectangular cost matrix (rows = tracks,
/// cols = detections).
///
/// The matrix is extended to `(rows + cols)^2`: the off-diagonal padding
/// costs `thresh / 2`, the padding-vs-padding block costs zero. Matching a
/// real pair is then only ever cheaper than sending both sides to padding
/// when its cost stays at or below `thresh`, which is re-checked explicitly
/// after the solve so ties land on the unmatched side.
pub fn linear_assignment(
    cost: &DMatrix<f32>,
    thresh: f32,
) -> AssociationData {
    let n_rows = cost.nrows();
    let n_cols = cost.ncols();
    if n_rows == 0 || n_cols == 0 {
        return AssociationData {
            matches: Vec::new(),
            unmatched_track_indices: (0..n_rows).collect(),
            unmatched_det_indices: (0..n_cols).collect(),
        };
    }

    let n = n_rows + n_cols;
    let pad = thresh as f64 / 2.0;
    let mut extended = vec![vec![pad; n]; n];
    for row in extended.iter_mut().skip(n_rows) {
        for cell in row.iter_mut().skip(n_cols) {
            *cell = 0.0;
        }
    }
    for i in 0..n_rows {
        for j in 0..n_cols {
            // Gated-out entries may be infinite; keep the duals finite.
            extended[i][j] = (cost[(i, j)] as f64).min(GATED);
        }
    }

    let mut x = vec![-1isize; n];
    let mut y = vec![-1isize; n];
    lapjv(n, &extended, &mut x, &mut y);

    let mut data = AssociationData::default();
    let mut det_matched = vec![false; n_cols];
    for (i, &xi) in x.iter().take(n_rows).enumerate() {
        let j = xi;
        if j >= 0 && (j as usize) < n_cols && cost[(i, j as usize)] <= thresh {
            data.matches.push((i, j as usize));
            det_matched[j as usize] = true;
        } else {
            data.unmatched_track_indices.push(i);
        }
    }
    for (j, &matched) in det_matched.iter().enumerate() {
        if !matched {
            data.unmatched_det_indices.push(j);
        }
    }
    data
}

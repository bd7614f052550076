//! Linear assignment (Hungarian method with row/column potentials).
//!
//! Used by the assignment policy to pair each query name part with at most
//! one reference name part so that the summed similarity is maximal.

/// Optimal one-to-one pairing of rows to columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    /// `(row, col)` pairs, sorted by row. Length is `min(rows, cols)`.
    pub pairs: Vec<(usize, usize)>,
    /// Sum of the weights of the chosen cells.
    pub total: f64,
}

impl Assignment {
    /// Mean weight per matched pair, 0 when nothing was matched.
    pub fn mean(&self) -> f64 {
        if self.pairs.is_empty() {
            0.0
        } else {
            self.total / self.pairs.len() as f64
        }
    }
}

/// A dense row-major weight matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::new(rows.len(), cols);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), cols, "ragged matrix");
            matrix.data[i * cols..(i + 1) * cols].copy_from_slice(row);
        }
        matrix
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }
}

/// Maximize total weight over one-to-one row/column pairings.
///
/// Runs in `O(n^2 * m)` for `n = min(rows, cols)`, `m = max(rows, cols)`.
/// Weights must be finite.
pub fn maximize(matrix: &Matrix) -> Assignment {
    if matrix.rows == 0 || matrix.cols == 0 {
        return Assignment {
            pairs: Vec::new(),
            total: 0.0,
        };
    }

    // The solver needs rows <= cols; solve the transpose otherwise.
    let transposed = matrix.rows > matrix.cols;
    let (n, m) = if transposed {
        (matrix.cols, matrix.rows)
    } else {
        (matrix.rows, matrix.cols)
    };
    // Minimize negated weights.
    let cost = |i: usize, j: usize| -> f64 {
        if transposed {
            -matrix.get(j, i)
        } else {
            -matrix.get(i, j)
        }
    };

    // 1-based potentials; column 0 is a virtual column holding the row being inserted.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut owner = vec![0_usize; m + 1];
    let mut way = vec![0_usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col0 = 0;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[col0] = true;
            let row0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0;

            for col in 1..=m {
                if used[col] {
                    continue;
                }
                let slack = cost(row0 - 1, col - 1) - u[row0] - v[col];
                if slack < min_slack[col] {
                    min_slack[col] = slack;
                    way[col] = col0;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    col1 = col;
                }
            }

            for col in 0..=m {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }

            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }

        // Augment along the alternating path.
        loop {
            let prev = way[col0];
            owner[col0] = owner[prev];
            col0 = prev;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&col| owner[col] != 0)
        .map(|col| {
            let (r, c) = (owner[col] - 1, col - 1);
            if transposed {
                (c, r)
            } else {
                (r, c)
            }
        })
        .collect();
    pairs.sort_unstable();

    let total = pairs.iter().map(|&(r, c)| matrix.get(r, c)).sum();
    Assignment { pairs, total }
}

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::{Index, IndexMut};

use crate::error::{NnError, Result};
use crate::math::kernels;

/// Amount of scalar work below which an operation stays on the calling thread.
const PARALLEL_THRESHOLD: usize = 1 << 14;

/// Smallest run of output elements handed to a single rayon task.
const MIN_CHUNK: usize = 256;

/// Half-width of the uniform range used by [`Matrix::random`].
pub const INIT_SCALE: f64 = 0.1;

/// Reshape direction for [`Matrix::flatten`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// A single row `(1, rows * cols)`.
    Row,
    /// A single column `(rows * cols, 1)`.
    Column,
}

/// Dense row-major matrix of `f64`.
///
/// `data.len() == rows * cols` holds for every value of this type; element
/// `(r, c)` lives at `data[r * cols + c]`. Cloning copies the whole buffer, so
/// two matrices never share storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Fills every element independently from `U[-INIT_SCALE, INIT_SCALE)`.
    pub fn random<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        let data = (0..rows * cols)
            .map(|_| kernels::random(rng) * INIT_SCALE)
            .collect();
        Matrix { rows, cols, data }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Matrix> {
        if data.len() != rows * cols {
            return Err(NnError::DataLength { rows, cols, len: data.len() });
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Wraps `data` as a `(1, data.len())` row vector.
    pub fn row_vector(data: Vec<f64>) -> Matrix {
        Matrix {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Elements in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        let idx = self.offset(row, col)?;
        Ok(self.data[idx])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let idx = self.offset(row, col)?;
        self.data[idx] = value;
        Ok(())
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(NnError::InvalidIndex {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    fn ensure_same_shape(&self, other: &Matrix, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(NnError::DimensionMismatch {
                op,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    fn zip_with<F>(&self, other: &Matrix, op: &'static str, f: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        self.ensure_same_shape(other, op)?;
        let data: Vec<f64> = if self.data.len() >= PARALLEL_THRESHOLD {
            self.data
                .par_iter()
                .zip(other.data.par_iter())
                .with_min_len(MIN_CHUNK)
                .map(|(&a, &b)| f(a, b))
                .collect()
        } else {
            self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect()
        };
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Element-wise product.
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with(other, "hadamard", |a, b| a * b)
    }

    /// Standard matrix product, `(n, k) x (k, m) -> (n, m)`.
    ///
    /// Each output element sums its products in ascending `k` order, so the
    /// result does not depend on how the elements are split across threads.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(NnError::DimensionMismatch {
                op: "matmul",
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (k, m) = (self.cols, other.cols);
        let mut res = Matrix::zeros(self.rows, m);
        let work = res.data.len() * k.max(1);
        fill_indexed(&mut res.data, work, |idx| {
            let (i, j) = (idx / m, idx % m);
            self.data[i * k..(i + 1) * k]
                .iter()
                .enumerate()
                .map(|(p, &a)| a * other.data[p * m + j])
                .sum()
        });
        Ok(res)
    }

    pub fn scalar_mul(&self, scalar: f64) -> Matrix {
        self.map(|x| x * scalar)
    }

    pub fn transpose(&self) -> Matrix {
        let (rows, cols) = (self.rows, self.cols);
        let mut res = Matrix::zeros(cols, rows);
        let work = res.data.len();
        // res(j, i) = self(i, j)
        fill_indexed(&mut res.data, work, |idx| {
            let (j, i) = (idx / rows, idx % rows);
            self.data[i * cols + j]
        });
        res
    }

    /// Reinterprets the row-major buffer as a single row or column.
    pub fn flatten(&self, axis: Axis) -> Matrix {
        let len = self.data.len();
        let (rows, cols) = match axis {
            Axis::Row => (1, len),
            Axis::Column => (len, 1),
        };
        Matrix {
            rows,
            cols,
            data: self.data.clone(),
        }
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let mut res = self.clone();
        res.map_in_place(functor);
        res
    }

    fn map_in_place<F>(&mut self, functor: F)
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        if self.data.len() >= PARALLEL_THRESHOLD {
            self.data
                .par_iter_mut()
                .with_min_len(MIN_CHUNK)
                .for_each(|x| *x = functor(*x));
        } else {
            self.data.iter_mut().for_each(|x| *x = functor(*x));
        }
    }

    pub fn add_in_place(&mut self, other: &Matrix) -> Result<()> {
        self.ensure_same_shape(other, "add_in_place")?;
        if self.data.len() >= PARALLEL_THRESHOLD {
            self.data
                .par_iter_mut()
                .zip(other.data.par_iter())
                .with_min_len(MIN_CHUNK)
                .for_each(|(a, &b)| *a += b);
        } else {
            self.data.iter_mut().zip(&other.data).for_each(|(a, &b)| *a += b);
        }
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn apply_sigmoid(&mut self) {
        self.map_in_place(kernels::sigmoid);
    }

    /// Replaces each stored sigmoid output `y` with `y * (1 - y)`.
    pub fn apply_sigmoid_derivative(&mut self) {
        self.map_in_place(kernels::sigmoid_derivative);
    }

    pub fn apply_relu(&mut self) {
        self.map_in_place(kernels::relu);
    }

    /// 1 where the stored value is positive, 0 elsewhere.
    pub fn apply_relu_derivative(&mut self) {
        self.map_in_place(kernels::relu_derivative);
    }

    /// Softmax over the entire buffer. Only meaningful on a single-row matrix.
    pub fn apply_softmax(&mut self) {
        self.data = kernels::softmax(&self.data);
    }

    /// Flat index of the largest element (first one on ties).
    pub fn argmax(&self) -> usize {
        self.data
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best, max), (i, &x)| {
                if x > max { (i, x) } else { (best, max) }
            })
            .0
    }
}

/// Writes `f(idx)` into every slot of `out`, fanning out over rayon when the
/// estimated `work` is large enough.
fn fill_indexed<F>(out: &mut [f64], work: usize, f: F)
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    if work >= PARALLEL_THRESHOLD {
        out.par_iter_mut()
            .enumerate()
            .with_min_len(MIN_CHUNK)
            .for_each(|(idx, v)| *v = f(idx));
    } else {
        out.iter_mut().enumerate().for_each(|(idx, v)| *v = f(idx));
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({}, {}) out of bounds for a {}x{} matrix",
            row, col, self.rows, self.cols
        );
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({}, {}) out of bounds for a {}x{} matrix",
            row, col, self.rows, self.cols
        );
        &mut self.data[row * self.cols + col]
    }
}

impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            rows: usize,
            cols: usize,
            data: Vec<f64>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Matrix::from_vec(raw.rows, raw.cols, raw.data).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn m(rows: usize, cols: usize, data: &[f64]) -> Matrix {
        Matrix::from_vec(rows, cols, data.to_vec()).unwrap()
    }

    fn assert_close(a: &Matrix, b: &Matrix, eps: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert_abs_diff_eq!(x, y, epsilon = eps);
        }
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = Matrix::from_vec(2, 3, vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, NnError::DataLength { rows: 2, cols: 3, len: 5 }));
    }

    #[test]
    fn random_is_small_and_symmetric() {
        let mut rng = StdRng::seed_from_u64(1);
        let r = Matrix::random(50, 40, &mut rng);
        assert!(r.as_slice().iter().all(|x| x.abs() <= INIT_SCALE));
        assert!(r.as_slice().iter().any(|&x| x < 0.0));
        assert!(r.as_slice().iter().any(|&x| x > 0.0));
    }

    #[test]
    fn checked_access() {
        let mut a = Matrix::zeros(2, 2);
        a.set(1, 0, 4.0).unwrap();
        assert_eq!(a.get(1, 0).unwrap(), 4.0);
        assert_eq!(a[(1, 0)], 4.0);
        assert!(matches!(a.get(2, 0), Err(NnError::InvalidIndex { row: 2, .. })));
        assert!(a.set(0, 2, 1.0).is_err());
    }

    #[test]
    #[should_panic]
    fn index_out_of_bounds_panics() {
        let a = Matrix::zeros(2, 2);
        let _ = a[(0, 2)];
    }

    #[test]
    fn add_commutes_and_sub_antisymmetric() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = Matrix::random(3, 4, &mut rng);
        let b = Matrix::random(3, 4, &mut rng);
        assert_eq!(a.add(&b).unwrap(), b.add(&a).unwrap());
        let lhs = a.sub(&b).unwrap();
        let rhs = b.sub(&a).unwrap().scalar_mul(-1.0);
        assert_close(&lhs, &rhs, 0.0);
    }

    #[test]
    fn elementwise_ops_reject_mismatched_shapes() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(3, 2);
        for res in [a.add(&b), a.sub(&b), a.hadamard(&b)] {
            assert!(matches!(res, Err(NnError::DimensionMismatch { .. })));
        }
        let mut c = a.clone();
        assert!(c.add_in_place(&b).is_err());
        assert_eq!(c, a);
    }

    #[test]
    fn matmul_small_product() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = m(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c, m(2, 2, &[58.0, 64.0, 139.0, 154.0]));
        assert!(matches!(a.matmul(&a), Err(NnError::DimensionMismatch { op: "matmul", .. })));
    }

    #[test]
    fn matmul_is_associative() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Matrix::random(4, 5, &mut rng);
        let b = Matrix::random(5, 6, &mut rng);
        let c = Matrix::random(6, 3, &mut rng);
        let left = a.matmul(&b).unwrap().matmul(&c).unwrap();
        let right = a.matmul(&b.matmul(&c).unwrap()).unwrap();
        assert_close(&left, &right, 1e-12);
    }

    #[test]
    fn parallel_matmul_matches_serial_definition() {
        let mut rng = StdRng::seed_from_u64(4);
        let a = Matrix::random(40, 60, &mut rng);
        let b = Matrix::random(60, 30, &mut rng);
        let c = a.matmul(&b).unwrap();
        for i in [0, 17, 39] {
            for j in [0, 11, 29] {
                let expected: f64 = (0..60).map(|p| a[(i, p)] * b[(p, j)]).sum();
                assert_eq!(c[(i, j)], expected);
            }
        }
    }

    #[test]
    fn hadamard_and_scalar() {
        let a = m(1, 3, &[1.0, -2.0, 3.0]);
        let b = m(1, 3, &[2.0, 2.0, 0.5]);
        assert_eq!(a.hadamard(&b).unwrap(), m(1, 3, &[2.0, -4.0, 1.5]));
        assert_eq!(a.scalar_mul(2.0), m(1, 3, &[2.0, -4.0, 6.0]));
    }

    #[test]
    fn transpose_twice_is_identity() {
        let mut rng = StdRng::seed_from_u64(5);
        for (r, c) in [(1, 7), (3, 4), (200, 150)] {
            let a = Matrix::random(r, c, &mut rng);
            let t = a.transpose();
            assert_eq!(t.shape(), (c, r));
            assert_eq!(t[(c - 1, 0)], a[(0, c - 1)]);
            assert_eq!(t.transpose(), a);
        }
    }

    #[test]
    fn flatten_keeps_storage_order() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let row = a.flatten(Axis::Row);
        assert_eq!(row.shape(), (1, 6));
        assert_eq!(row.as_slice(), a.as_slice());
        assert_eq!(row.flatten(Axis::Column), a.flatten(Axis::Column));
        assert_eq!(a.flatten(Axis::Column).shape(), (6, 1));
    }

    #[test]
    fn in_place_activations() {
        let mut a = m(1, 4, &[-1.0, 0.0, 0.5, 2.0]);
        a.apply_relu();
        assert_eq!(a, m(1, 4, &[0.0, 0.0, 0.5, 2.0]));
        a.apply_relu_derivative();
        assert_eq!(a, m(1, 4, &[0.0, 0.0, 1.0, 1.0]));

        let mut s = m(1, 2, &[0.0, 0.0]);
        s.apply_sigmoid();
        assert_eq!(s, m(1, 2, &[0.5, 0.5]));
        s.apply_sigmoid_derivative();
        assert_eq!(s, m(1, 2, &[0.25, 0.25]));
    }

    #[test]
    fn softmax_row_sums_to_one() {
        let mut a = m(1, 3, &[1000.0, 1000.0, 1.0]);
        a.apply_softmax();
        assert_eq!(a.shape(), (1, 3));
        assert_abs_diff_eq!(a.as_slice().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(a.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn add_in_place_and_fill() {
        let mut a = Matrix::zeros(130, 130);
        let mut b = Matrix::zeros(130, 130);
        b.fill(0.25);
        a.add_in_place(&b).unwrap();
        a.add_in_place(&b).unwrap();
        assert!(a.as_slice().iter().all(|&x| x == 0.5));
    }

    #[test]
    fn clones_do_not_alias() {
        let a = m(1, 2, &[1.0, 2.0]);
        let mut b = a.clone();
        b.fill(9.0);
        assert_eq!(a, m(1, 2, &[1.0, 2.0]));
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(m(1, 4, &[0.1, 0.7, 0.7, 0.0]).argmax(), 1);
    }

    #[test]
    fn json_round_trip_validates_length() {
        use rand::{rngs::StdRng, SeedableRng};
        let a = Matrix::random(7, 5, &mut StdRng::seed_from_u64(21));
        let json = serde_json::to_string(&a).unwrap();
        let back: Matrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
        let bad = r#"{"rows":2,"cols":2,"data":[1.0]}"#;
        assert!(serde_json::from_str::<Matrix>(bad).is_err());
    }
}

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Row/column-separable 2-D FFT of a fixed shape, planned once.
pub(crate) struct Fft2d {
    shape: (usize, usize),
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub(crate) fn new(shape: (usize, usize)) -> Self {
        let (height, width) = shape;
        let mut planner = FftPlanner::new();

        Self {
            shape,
            row_forward: planner.plan_fft_forward(width),
            col_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    /// Forward transform of `input` zero-padded to the planned shape.
    pub(crate) fn forward_padded(&self, input: &Array2<f64>) -> Array2<Complex64> {
        debug_assert!(input.nrows() <= self.shape.0 && input.ncols() <= self.shape.1);
        let mut result = Array2::<Complex64>::zeros(self.shape);
        for ((row, col), &value) in input.indexed_iter() {
            result[[row, col]] = Complex64::new(value, 0.0);
        }

        self.process(&mut result, &self.row_forward, &self.col_forward);
        result
    }

    /// Normalized inverse transform, keeping only the real part.
    pub(crate) fn inverse_real(&self, mut spectrum: Array2<Complex64>) -> Array2<f64> {
        self.process(&mut spectrum, &self.row_inverse, &self.col_inverse);
        let scale = 1.0 / (self.shape.0 * self.shape.1) as f64;
        spectrum.mapv(|value| value.re * scale)
    }

    /// Circular cross-correlation `sum_x a(x) b(x + d)` from the spectra of
    /// `a` and `b`, indexed by `d` modulo the planned shape.
    pub(crate) fn cross_correlate(&self, a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<f64> {
        let mut product = Array2::<Complex64>::zeros(self.shape);
        ndarray::Zip::from(&mut product)
            .and(a)
            .and(b)
            .for_each(|out, &fa, &fb| *out = fa.conj() * fb);
        self.inverse_real(product)
    }

    fn process(&self, data: &mut Array2<Complex64>, row_fft: &Arc<dyn Fft<f64>>, col_fft: &Arc<dyn Fft<f64>>) {
        let mut buffer = Vec::with_capacity(self.shape.0.max(self.shape.1));

        for mut row in data.rows_mut() {
            buffer.clear();
            buffer.extend(row.iter().copied());
            row_fft.process(&mut buffer);
            for (dst, src) in row.iter_mut().zip(&buffer) {
                *dst = *src;
            }
        }

        for mut col in data.columns_mut() {
            buffer.clear();
            buffer.extend(col.iter().copied());
            col_fft.process(&mut buffer);
            for (dst, src) in col.iter_mut().zip(&buffer) {
                *dst = *src;
            }
        }
    }
}

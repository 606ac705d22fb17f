// FFT-based registration of masked images
pub(crate) mod fft;
pub mod masked_correlation;

pub use masked_correlation::*;

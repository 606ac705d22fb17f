//! Unit-area peak shapes parametrized by full width at half maximum.

use std::f64::consts::{LN_2, PI};

/// Normal distribution centered at `center`.
pub fn gaussian(x: f64, center: f64, fwhm: f64) -> f64 {
    let sigma = fwhm / (2.0 * (2.0 * LN_2).sqrt());
    let z = (x - center) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

/// Cauchy distribution centered at `center`.
pub fn lorentzian(x: f64, center: f64, fwhm: f64) -> f64 {
    let gamma = fwhm / 2.0;
    let dx = x - center;
    gamma / (PI * (dx * dx + gamma * gamma))
}

/// Pseudo-Voigt approximation of the convolution of a Gaussian and a
/// Lorentzian (Thompson, Cox & Hastings, 1987).
pub fn pseudo_voigt(x: f64, center: f64, fwhm_gaussian: f64, fwhm_lorentzian: f64) -> f64 {
    let (fwhm, eta) = pseudo_voigt_mixing(fwhm_gaussian, fwhm_lorentzian);
    eta * lorentzian(x, center, fwhm) + (1.0 - eta) * gaussian(x, center, fwhm)
}

/// Total width and Lorentzian fraction of the pseudo-Voigt profile.
pub fn pseudo_voigt_mixing(fwhm_gaussian: f64, fwhm_lorentzian: f64) -> (f64, f64) {
    let g = fwhm_gaussian;
    let l = fwhm_lorentzian;
    let fwhm = (g.powi(5)
        + 2.69269 * g.powi(4) * l
        + 2.42843 * g.powi(3) * l.powi(2)
        + 4.47163 * g.powi(2) * l.powi(3)
        + 0.07842 * g * l.powi(4)
        + l.powi(5))
    .powf(0.2);

    let ratio = l / fwhm;
    let eta = 1.36603 * ratio - 0.47719 * ratio.powi(2) + 0.11116 * ratio.powi(3);
    (fwhm, eta)
}

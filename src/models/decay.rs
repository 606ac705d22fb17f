//! Time-resolved intensity models. Both are flat at `offset` before `tzero`.

pub fn exponential(t: f64, tzero: f64, amp: f64, tconst: f64, offset: f64) -> f64 {
    if t < tzero {
        return offset;
    }
    amp * (-(t - tzero) / tconst).exp() + offset
}

pub fn biexponential(
    t: f64,
    tzero: f64,
    amp1: f64,
    amp2: f64,
    tconst1: f64,
    tconst2: f64,
    offset: f64,
) -> f64 {
    if t < tzero {
        return offset;
    }
    let dt = t - tzero;
    amp1 * (-dt / tconst1).exp() + amp2 * (-dt / tconst2).exp() + offset
}

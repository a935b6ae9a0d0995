//! Pearson correlation over aligned return observations

use crate::models::ReturnPoint;

/// Pearson correlation coefficient of two equal-length samples.
///
/// Returns `None` for fewer than two observations, mismatched lengths, or a
/// constant sample (zero variance).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    if is_constant(xs) || is_constant(ys) {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Values of two date-sorted slices on their common dates.
///
/// Days where either value is not finite are dropped.
pub fn align(a: &[ReturnPoint], b: &[ReturnPoint]) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(a.len().min(b.len()));
    let mut ys = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].date.cmp(&b[j].date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                if a[i].value.is_finite() && b[j].value.is_finite() {
                    xs.push(a[i].value);
                    ys.push(b[j].value);
                }
                i += 1;
                j += 1;
            }
        }
    }

    (xs, ys)
}

/// Round to four decimal places, the precision correlations are reported at
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

use nalgebra::{Matrix3, Vector3};

/// Fewest atoms that still determine a rigid-body fit.
pub const MIN_FIT_ATOMS: usize = 3;

fn centroid(points: &[[f32; 3]]) -> Vector3<f64> {
    let n = points.len();
    if n == 0 {
        return Vector3::zeros();
    }
    let mut sum = Vector3::zeros();
    for p in points {
        sum[0] += p[0] as f64;
        sum[1] += p[1] as f64;
        sum[2] += p[2] as f64;
    }
    sum / n as f64
}

/// Kabsch least-squares fit of `frame` onto `reference`: returns the
/// rotation and translation such that `r * p + t` best aligns the frame
/// points with the reference points. `None` when fewer than
/// `MIN_FIT_ATOMS` pairs are available or the covariance decomposition
/// fails.
pub fn fit_transform(
    frame: &[[f32; 3]],
    reference: &[[f32; 3]],
) -> Option<(Matrix3<f64>, Vector3<f64>)> {
    let n = frame.len().min(reference.len());
    if n < MIN_FIT_ATOMS {
        return None;
    }
    let frame = &frame[..n];
    let reference = &reference[..n];

    let cx = centroid(frame);
    let cy = centroid(reference);
    let mut h = Matrix3::zeros();
    for i in 0..n {
        let xr = Vector3::new(
            frame[i][0] as f64 - cx[0],
            frame[i][1] as f64 - cx[1],
            frame[i][2] as f64 - cx[2],
        );
        let yr = Vector3::new(
            reference[i][0] as f64 - cy[0],
            reference[i][1] as f64 - cy[1],
            reference[i][2] as f64 - cy[2],
        );
        h += xr * yr.transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return None,
    };
    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let mut v_t_adj = v_t;
        v_t_adj.row_mut(2).neg_mut();
        r = v_t_adj.transpose() * u.transpose();
    }
    let t = cy - r * cx;
    Some((r, t))
}

/// Applies `r * p + t` to every point in the buffer.
pub fn apply_transform(coords: &mut [[f32; 3]], r: &Matrix3<f64>, t: &Vector3<f64>) {
    for p in coords.iter_mut() {
        let x = p[0] as f64;
        let y = p[1] as f64;
        let z = p[2] as f64;
        p[0] = (r[(0, 0)] * x + r[(0, 1)] * y + r[(0, 2)] * z + t[0]) as f32;
        p[1] = (r[(1, 0)] * x + r[(1, 1)] * y + r[(1, 2)] * z + t[1]) as f32;
        p[2] = (r[(2, 0)] * x + r[(2, 1)] * y + r[(2, 2)] * z + t[2]) as f32;
    }
}

/// Extracts the points at the given buffer positions.
pub fn gather(coords: &[[f32; 3]], positions: &[usize]) -> Vec<[f32; 3]> {
    positions.iter().map(|&i| coords[i]).collect()
}

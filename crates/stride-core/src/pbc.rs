use std::f64::consts::TAU;

/// Mean of one coordinate axis treated as an angle over the box length, so
/// a cluster straddling the boundary averages to the cluster, not the box
/// middle. `subset` restricts the mean to those buffer positions.
pub fn circular_mean(
    coords: &[[f32; 3]],
    dim: usize,
    length: f32,
    subset: Option<&[usize]>,
) -> f32 {
    if length <= 0.0 || coords.is_empty() {
        return 0.0;
    }
    let scale = TAU / length as f64;
    let mut sin_sum = 0.0f64;
    let mut cos_sum = 0.0f64;
    let mut n = 0usize;
    match subset {
        Some(positions) => {
            for &i in positions {
                let a = coords[i][dim] as f64 * scale;
                sin_sum += a.sin();
                cos_sum += a.cos();
                n += 1;
            }
        }
        None => {
            for p in coords {
                let a = p[dim] as f64 * scale;
                sin_sum += a.sin();
                cos_sum += a.cos();
                n += 1;
            }
        }
    }
    if n == 0 {
        return 0.0;
    }
    (sin_sum.atan2(cos_sum) / scale) as f32
}

/// Translates so the circular mean of the subset sits at the box center,
/// then wraps every coordinate into `[0, length)`.
pub fn center_pbc(coords: &mut [[f32; 3]], lengths: [f32; 3], subset: Option<&[usize]>) {
    if coords.is_empty() || lengths.iter().any(|&l| l <= 0.0) {
        return;
    }
    let mut shift = [0.0f32; 3];
    for d in 0..3 {
        let mean = circular_mean(coords, d, lengths[d], subset);
        shift[d] = lengths[d] * 0.5 - mean;
    }
    for p in coords.iter_mut() {
        for d in 0..3 {
            p[d] = (p[d] + shift[d]).rem_euclid(lengths[d]);
        }
    }
}

/// Moves every atom to the periodic image nearest the arithmetic mean of
/// the subset.
pub fn remove_periodicity(coords: &mut [[f32; 3]], lengths: [f32; 3], subset: Option<&[usize]>) {
    if coords.is_empty() {
        return;
    }
    let mut mean = [0.0f64; 3];
    let mut n = 0usize;
    match subset {
        Some(positions) => {
            for &i in positions {
                for d in 0..3 {
                    mean[d] += coords[i][d] as f64;
                }
                n += 1;
            }
        }
        None => {
            for p in coords.iter() {
                for d in 0..3 {
                    mean[d] += p[d] as f64;
                }
                n += 1;
            }
        }
    }
    if n == 0 {
        return;
    }
    for d in 0..3 {
        mean[d] /= n as f64;
    }
    for p in coords.iter_mut() {
        for d in 0..3 {
            let l = lengths[d] as f64;
            if l > 0.0 {
                let dx = p[d] as f64 - mean[d];
                p[d] -= ((dx / l).round() * l) as f32;
            }
        }
    }
}

/// Sequential unwrap relative to the previous atom, assuming bonded-neighbor
/// ordering: a component jump larger than 0.9 box extents shifts the atom by
/// the full (row-wise, triclinic-aware) box vector.
pub fn remove_pbc(coords: &mut [[f32; 3]], rows: [f32; 9]) {
    for i in 1..coords.len() {
        for j in 0..3 {
            let extent = rows[j * 3 + j];
            if extent <= 0.0 {
                continue;
            }
            let dist = coords[i][j] - coords[i - 1][j];
            if dist.abs() > 0.9 * extent {
                if dist > 0.0 {
                    for d in 0..3 {
                        coords[i][d] -= rows[j * 3 + d];
                    }
                } else {
                    for d in 0..3 {
                        coords[i][d] += rows[j * 3 + d];
                    }
                }
            }
        }
    }
}

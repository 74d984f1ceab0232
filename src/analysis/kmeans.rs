use anyhow::{bail, Result};
use ndarray::ArrayView2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const MAX_ITERATIONS: usize = 300;

/// K-means clustering result
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster index per input row
    pub assignments: Vec<usize>,
    /// Final centroids `[k * dim]`, row-major
    pub centroids: Vec<f32>,
    /// Iterations until convergence
    pub iterations: usize,
}

/// Seeded Lloyd's k-means over row-major points.
///
/// Centroids are seeded greedily: a random first point, then repeatedly the
/// point farthest from its nearest chosen centroid.
pub fn cluster(points: &[f32], dim: usize, k: usize, seed: u64) -> Result<KMeansResult> {
    if dim == 0 {
        bail!("k-means needs at least one dimension");
    }
    let n = points.len() / dim;
    if points.len() != n * dim {
        bail!("point buffer of {} values is not a multiple of dim {}", points.len(), dim);
    }
    if k == 0 || k > n {
        bail!("cannot form {} clusters from {} points", k, n);
    }

    let view = ArrayView2::from_shape((n, dim), points)?;
    let row = |i: usize| view.row(i);

    let distance = |a: ndarray::ArrayView1<f32>, b: &[f32]| -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    };

    // greedy farthest-point seeding
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids: Vec<Vec<f32>> = vec![row(rng.gen_range(0..n)).to_vec()];
    while centroids.len() < k {
        let farthest = (0..n)
            .map(|i| {
                let nearest = centroids
                    .iter()
                    .map(|c| distance(row(i), c))
                    .fold(f32::INFINITY, f32::min);
                (i, nearest)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        centroids.push(row(farthest).to_vec());
    }

    let mut assignments = vec![0usize; n];
    let mut iterations = 0;

    for iteration in 0..MAX_ITERATIONS {
        iterations = iteration + 1;

        let mut changed = false;
        for i in 0..n {
            let best = centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| (c, distance(row(i), centroid)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c)
                .unwrap_or(0);
            if assignments[i] != best {
                assignments[i] = best;
                changed = true;
            }
        }

        if !changed && iteration > 0 {
            break;
        }

        let mut counts = vec![0usize; k];
        let mut sums = vec![vec![0.0f32; dim]; k];
        for i in 0..n {
            let c = assignments[i];
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(row(i)) {
                *s += v;
            }
        }

        for c in 0..k {
            if counts[c] == 0 {
                // re-seed an empty cluster from the point farthest from its centroid
                let farthest = (0..n)
                    .map(|i| (i, distance(row(i), &centroids[assignments[i]])))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                centroids[c] = row(farthest).to_vec();
            } else {
                for (d, s) in sums[c].iter().enumerate() {
                    centroids[c][d] = s / counts[c] as f32;
                }
            }
        }
    }

    Ok(KMeansResult {
        assignments,
        centroids: centroids.into_iter().flatten().collect(),
        iterations,
    })
}

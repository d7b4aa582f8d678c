use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::traits::{Partition, VectorPartitioner};

const DEFAULT_SEED: u64 = 42;
const MAX_ITER: usize = 300;
const RESTARTS: usize = 4;
const CONVERGENCE_TOLERANCE: f32 = 1e-6;

/// Lloyd's k-means with k-means++ seeding over squared Euclidean distance.
///
/// Runs `RESTARTS` independent seedings from one fixed-seed generator and
/// keeps the lowest-inertia result, so the same input always produces the
/// same partition.
#[derive(Debug, Clone)]
pub struct KMeans {
    seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl KMeans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn run_once(&self, vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> (Partition, f32) {
        let mut centroids = plusplus_init(vectors, k, rng);

        for _ in 0..MAX_ITER {
            let assignments = assign(vectors, &centroids);
            let updated = recompute(vectors, &assignments, &centroids);
            let converged = centroids
                .iter()
                .zip(&updated)
                .all(|(old, new)| squared_distance(old, new) <= CONVERGENCE_TOLERANCE);
            centroids = updated;
            if converged {
                break;
            }
        }

        let assignments = assign(vectors, &centroids);
        let inertia = vectors
            .iter()
            .zip(&assignments)
            .map(|(v, &c)| squared_distance(v, &centroids[c]))
            .sum();

        (
            Partition {
                assignments,
                centroids,
            },
            inertia,
        )
    }
}

impl VectorPartitioner for KMeans {
    fn partition(&self, vectors: &[Vec<f32>], k: usize) -> Result<Partition> {
        if vectors.is_empty() {
            bail!("cannot partition an empty set of vectors");
        }
        if k == 0 || k > vectors.len() {
            bail!("cluster count {k} must be between 1 and {}", vectors.len());
        }
        let dim = vectors[0].len();
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            bail!("vectors must share one non-zero dimension");
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(Partition, f32)> = None;
        for _ in 0..RESTARTS {
            let (partition, inertia) = self.run_once(vectors, k, &mut rng);
            if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
                best = Some((partition, inertia));
            }
        }

        match best {
            Some((partition, _)) => Ok(partition),
            None => bail!("k-means produced no partition"),
        }
    }
}

/// Pick the first centroid uniformly, then each next one with probability
/// proportional to its squared distance from the nearest chosen centroid.
fn plusplus_init(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors[rng.random_range(0..vectors.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f32> = vectors
            .iter()
            .map(|v| nearest(v, &centroids).1)
            .collect();
        let total: f32 = distances.iter().sum();

        // All points coincide with a centroid already: duplicates are fine.
        if total <= 0.0 {
            centroids.push(vectors[rng.random_range(0..vectors.len())].clone());
            continue;
        }

        let mut target = rng.random::<f32>() * total;
        let mut chosen = None;
        for (i, &d) in distances.iter().enumerate() {
            if d <= 0.0 {
                continue;
            }
            chosen = Some(i);
            target -= d;
            if target <= 0.0 {
                break;
            }
        }
        if let Some(i) = chosen {
            centroids.push(vectors[i].clone());
        }
    }

    centroids
}

fn assign(vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    vectors.iter().map(|v| nearest(v, centroids).0).collect()
}

/// Mean of each cluster's members. An empty cluster keeps its old centroid.
fn recompute(vectors: &[Vec<f32>], assignments: &[usize], centroids: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let dim = centroids[0].len();
    let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (v, &c) in vectors.iter().zip(assignments) {
        for (acc, x) in sums[c].iter_mut().zip(v) {
            *acc += x;
        }
        counts[c] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .zip(centroids)
        .map(|((sum, count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|x| x / count as f32).collect()
            }
        })
        .collect()
}

/// (index, squared distance) of the closest centroid; lowest index wins ties.
fn nearest(v: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(v, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ]
    }

    #[test]
    fn test_separates_two_blobs() {
        let p = KMeans::new().partition(&blobs(), 2).unwrap();
        assert_eq!(p.assignments.len(), 6);
        assert_eq!(p.centroids.len(), 2);
        assert_eq!(p.assignments[0], p.assignments[1]);
        assert_eq!(p.assignments[0], p.assignments[2]);
        assert_eq!(p.assignments[3], p.assignments[4]);
        assert_eq!(p.assignments[3], p.assignments[5]);
        assert_ne!(p.assignments[0], p.assignments[3]);
    }

    #[test]
    fn test_same_seed_same_partition() {
        let a = KMeans::new().with_seed(7).partition(&blobs(), 2).unwrap();
        let b = KMeans::new().with_seed(7).partition(&blobs(), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_cluster_centroid_is_mean() {
        let p = KMeans::new().partition(&blobs(), 1).unwrap();
        assert!(p.assignments.iter().all(|&c| c == 0));
        let mean = &p.centroids[0];
        assert!((mean[0] - 5.0333333).abs() < 1e-4);
    }

    #[test]
    fn test_identical_vectors_do_not_panic() {
        let same = vec![vec![1.0, 1.0]; 4];
        let p = KMeans::new().partition(&same, 3).unwrap();
        assert_eq!(p.assignments.len(), 4);
        assert!(p.assignments.iter().all(|&c| c == p.assignments[0]));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(KMeans::new().partition(&[], 1).is_err());
        assert!(KMeans::new().partition(&blobs(), 0).is_err());
        assert!(KMeans::new().partition(&blobs(), 7).is_err());
        assert!(KMeans::new()
            .partition(&[vec![1.0], vec![1.0, 2.0]], 1)
            .is_err());
    }
}

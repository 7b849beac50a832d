//! Seeded k-means (Lloyd iterations, k-means++ initialisation).
//!
//! Several restarts are run from one seeded generator and the fit with the
//! lowest inertia wins, so the same input and seed always give the same
//! partition.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iter: usize,
    tol: f64,
    n_init: usize,
    seed: u64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster of each input point.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
}

impl KMeansFit {
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == cluster)
            .map(|(i, _)| i)
            .collect()
    }
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Cluster `data` into `min(k, data.len())` groups. `None` when there is
    /// nothing to cluster.
    pub fn fit(&self, data: &[Vec<f32>]) -> Option<KMeansFit> {
        let k = self.k.min(data.len());
        if k == 0 {
            return None;
        }

        let points: Vec<Vec<f64>> = data
            .iter()
            .map(|v| v.iter().map(|&x| f64::from(x)).collect())
            .collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..self.n_init {
            let fit = self.lloyd(&points, k, &mut rng);
            if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best
    }

    fn lloyd(&self, points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> KMeansFit {
        let mut centroids = init_plus_plus(points, k, rng);
        let mut labels = assign(points, &centroids);

        for _ in 0..self.max_iter {
            let updated = update(points, &labels, &centroids);
            let shift = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| squared_distance(old, new))
                .fold(0.0, f64::max);
            centroids = updated;
            labels = assign(points, &centroids);
            if shift <= self.tol {
                break;
            }
        }

        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(p, &c)| squared_distance(p, &centroids[c]))
            .sum();

        KMeansFit {
            labels,
            centroids,
            inertia,
        }
    }
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// First centroid uniform, the rest with probability proportional to the
/// squared distance to the nearest chosen centroid.
fn init_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let chosen = if !total.is_finite() || total <= 0.0 {
            rng.gen_range(0..points.len())
        } else {
            let mut target = rng.gen_range(0.0..total);
            weights
                .iter()
                .position(|&w| {
                    target -= w;
                    target < 0.0
                })
                .unwrap_or(points.len() - 1)
        };
        centroids.push(points[chosen].clone());
    }

    centroids
}

fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| nearest(p, centroids).0)
        .collect()
}

/// Index and squared distance of the closest candidate; ties go to the first.
pub fn nearest(point: &[f64], candidates: &[Vec<f64>]) -> (usize, f64) {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// Mean of each cluster; an emptied cluster keeps its previous centroid.
fn update(points: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (point, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (sum, x) in sums[label].iter_mut().zip(point) {
            *sum += x;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
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
    fn test_separates_blobs() {
        let fit = KMeans::new(2).fit(&blobs()).unwrap();

        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[0], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn test_same_seed_same_partition() {
        let a = KMeans::new(3).with_seed(7).fit(&blobs()).unwrap();
        let b = KMeans::new(3).with_seed(7).fit(&blobs()).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_k_is_capped_by_points() {
        let fit = KMeans::new(10).fit(&blobs()[..2]).unwrap();
        assert_eq!(fit.centroids.len(), 2);
        assert!(KMeans::new(3).fit(&[]).is_none());
    }

    #[test]
    fn test_identical_points() {
        let data = vec![vec![1.0, 1.0]; 5];
        let fit = KMeans::new(3).fit(&data).unwrap();
        assert_eq!(fit.labels.len(), 5);
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_non_finite_component_does_not_panic() {
        let data = vec![vec![0.0, 1.0], vec![f32::NAN, 0.0], vec![1.0, 0.0]];
        let fit = KMeans::new(2).fit(&data).unwrap();
        assert_eq!(fit.labels.len(), 3);
        assert!(fit.labels.iter().all(|&l| l < 2));
    }

    #[test]
    fn test_members() {
        let fit = KMeansFit {
            labels: vec![1, 0, 1],
            centroids: vec![vec![0.0], vec![1.0]],
            inertia: 0.0,
        };
        assert_eq!(fit.members(1), vec![0, 2]);
        assert!(fit.members(2).is_empty());
    }
}

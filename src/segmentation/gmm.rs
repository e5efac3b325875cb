//! Gaussian mixture color models
//!
//! Each class (foreground, background) is described by a mixture of
//! [`COMPONENTS`] full-covariance Gaussians over RGB.

/// Mixture components per class
pub const COMPONENTS: usize = 5;

type Color = [f64; 3];
type Matrix = [[f64; 3]; 3];

/// Added to the covariance diagonal when it is (near) singular
const COVARIANCE_REGULARIZATION: f64 = 0.01;

/// Trained Gaussian mixture over RGB colors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianMixture {
    weights: [f64; COMPONENTS],
    means: [Color; COMPONENTS],
    inverse_covariances: [Matrix; COMPONENTS],
    determinants: [f64; COMPONENTS],
}

impl GaussianMixture {
    /// Whether at least one component carries weight
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.weights.iter().any(|&w| w > 0.0)
    }

    #[must_use]
    pub fn weights(&self) -> &[f64; COMPONENTS] {
        &self.weights
    }

    /// Mixture density at `color`
    #[must_use]
    pub fn probability(&self, color: Color) -> f64 {
        (0..COMPONENTS)
            .map(|ci| self.weights[ci] * self.component_density(ci, color))
            .sum()
    }

    /// Unweighted density of component `ci`; zero for empty components
    #[must_use]
    pub fn component_density(&self, ci: usize, color: Color) -> f64 {
        if self.weights[ci] <= 0.0 {
            return 0.0;
        }
        let m = &self.means[ci];
        let inv = &self.inverse_covariances[ci];
        let d = [color[0] - m[0], color[1] - m[1], color[2] - m[2]];
        let mut mahalanobis = 0.0;
        for i in 0..3 {
            let row = d[0] * inv[0][i] + d[1] * inv[1][i] + d[2] * inv[2][i];
            mahalanobis += d[i] * row;
        }
        (-0.5 * mahalanobis).exp() / self.determinants[ci].sqrt()
    }

    /// Component that best explains `color`
    #[must_use]
    pub fn most_likely_component(&self, color: Color) -> usize {
        let mut best = 0;
        let mut best_density = 0.0;
        for ci in 0..COMPONENTS {
            let density = self.component_density(ci, color);
            if density > best_density {
                best = ci;
                best_density = density;
            }
        }
        best
    }
}

/// Accumulates per-component sample statistics and produces a mixture
#[derive(Debug, Clone, Default)]
pub struct MixtureLearner {
    sums: [Color; COMPONENTS],
    products: [Matrix; COMPONENTS],
    counts: [u64; COMPONENTS],
}

impl MixtureLearner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, component: usize, color: Color) {
        let ci = component.min(COMPONENTS - 1);
        for i in 0..3 {
            self.sums[ci][i] += color[i];
            for j in 0..3 {
                self.products[ci][i][j] += color[i] * color[j];
            }
        }
        self.counts[ci] += 1;
    }

    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Turn the accumulated statistics into mixture parameters
    #[must_use]
    pub fn finish(&self) -> GaussianMixture {
        let total = self.sample_count();
        let mut gmm = GaussianMixture::default();
        if total == 0 {
            return gmm;
        }

        for ci in 0..COMPONENTS {
            let n = self.counts[ci];
            if n == 0 {
                continue;
            }
            let nf = n as f64;
            gmm.weights[ci] = nf / total as f64;

            let mean = [
                self.sums[ci][0] / nf,
                self.sums[ci][1] / nf,
                self.sums[ci][2] / nf,
            ];
            let mut cov = [[0.0; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    cov[i][j] = self.products[ci][i][j] / nf - mean[i] * mean[j];
                }
            }

            let mut det = determinant(&cov);
            if det <= f64::EPSILON {
                for (i, row) in cov.iter_mut().enumerate() {
                    row[i] += COVARIANCE_REGULARIZATION;
                }
                det = determinant(&cov);
            }

            gmm.means[ci] = mean;
            gmm.determinants[ci] = det;
            gmm.inverse_covariances[ci] = inverse(&cov, det);
        }
        gmm
    }
}

/// Deterministic k-means; returns the cluster index of every sample
///
/// Seeds are chosen by farthest-point traversal starting from the sample
/// mean, so minority colors get their own cluster from the start.
#[must_use]
pub fn kmeans(samples: &[Color], k: usize, rounds: usize) -> Vec<usize> {
    let mut labels = vec![0usize; samples.len()];
    if samples.is_empty() || k == 0 {
        return labels;
    }

    let n = samples.len() as f64;
    let mut mean = [0.0; 3];
    for s in samples {
        for c in 0..3 {
            mean[c] += s[c] / n;
        }
    }

    let mut centers: Vec<Color> = Vec::with_capacity(k);
    let mut nearest: Vec<f64> = samples.iter().map(|s| distance_sq(s, &mean)).collect();
    for _ in 0..k {
        let (index, _) = nearest
            .iter()
            .enumerate()
            .fold((0, -1.0), |best, (i, &d)| if d > best.1 { (i, d) } else { best });
        let center = samples[index];
        for (d, s) in nearest.iter_mut().zip(samples) {
            *d = d.min(distance_sq(s, &center));
        }
        centers.push(center);
    }

    for _ in 0..rounds.max(1) {
        let mut changed = false;
        for (label, s) in labels.iter_mut().zip(samples) {
            let best = nearest_center(&centers, s);
            if *label != best {
                *label = best;
                changed = true;
            }
        }

        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (&label, s) in labels.iter().zip(samples) {
            for c in 0..3 {
                sums[label][c] += s[c];
            }
            counts[label] += 1;
        }
        for ci in 0..k {
            if counts[ci] > 0 {
                let cnt = counts[ci] as f64;
                centers[ci] = [sums[ci][0] / cnt, sums[ci][1] / cnt, sums[ci][2] / cnt];
            }
        }

        if !changed {
            break;
        }
    }
    labels
}

fn nearest_center(centers: &[Color], sample: &Color) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = distance_sq(sample, center);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn determinant(m: &Matrix) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &Matrix, det: f64) -> Matrix {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_separates_minority_color() {
        let mut samples = vec![[250.0, 250.0, 250.0]; 95];
        samples.extend(vec![[5.0, 5.0, 5.0]; 5]);

        let labels = kmeans(&samples, COMPONENTS, 10);
        assert!(labels[..95].iter().all(|&l| l == labels[0]));
        assert!(labels[95..].iter().all(|&l| l == labels[95]));
        assert_ne!(labels[0], labels[95]);
    }

    #[test]
    fn test_learned_mixture_prefers_its_colors() {
        let mut learner = MixtureLearner::new();
        for i in 0..50 {
            let jitter = f64::from(i % 5);
            learner.add_sample(0, [200.0 + jitter, 30.0, 30.0]);
            learner.add_sample(1, [20.0, 20.0 + jitter, 220.0]);
        }
        let gmm = learner.finish();

        assert!(gmm.is_trained());
        assert!((gmm.weights()[0] - 0.5).abs() < 1e-12);
        assert_eq!(gmm.most_likely_component([202.0, 30.0, 30.0]), 0);
        assert_eq!(gmm.most_likely_component([20.0, 22.0, 220.0]), 1);
        assert!(gmm.probability([201.0, 30.0, 30.0]) > gmm.probability([120.0, 120.0, 120.0]));
    }

    #[test]
    fn test_constant_samples_are_regularized() {
        let mut learner = MixtureLearner::new();
        for _ in 0..10 {
            learner.add_sample(0, [255.0, 255.0, 255.0]);
        }
        let gmm = learner.finish();
        let at_mean = gmm.probability([255.0, 255.0, 255.0]);
        assert!(at_mean.is_finite() && at_mean > 0.0);
        assert_eq!(GaussianMixture::default().probability([0.0; 3]), 0.0);
    }
}

//! Iterative GMM + graph-cut foreground extraction

use super::gmm::{kmeans, MixtureLearner, COMPONENTS};
use super::graph::FlowGraph;
use super::{ColorModels, SegmentationSolver, SolverInit};
use crate::error::{LayerKitError, Result};
use crate::mask::{Trimap, TrimapLabel};
use image::RgbImage;
use tracing::{debug, instrument, trace};

/// Smoothness weight of neighbour links
const GAMMA: f64 = 50.0;
/// Capacity that pins definite labels to their terminal
const LAMBDA: f64 = 9.0 * GAMMA;
const KMEANS_ROUNDS: usize = 10;

/// GrabCut energy minimiser
#[derive(Debug, Clone, Copy, Default)]
pub struct GrabCutSolver;

impl GrabCutSolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SegmentationSolver for GrabCutSolver {
    fn name(&self) -> &'static str {
        "grabcut"
    }

    #[instrument(
        skip(self, image, trimap, models),
        fields(width = image.width(), height = image.height())
    )]
    fn run(
        &self,
        image: &RgbImage,
        trimap: &mut Trimap,
        models: &mut ColorModels,
        init: SolverInit,
        iterations: u32,
    ) -> Result<()> {
        if let SolverInit::Rect(rect) = init {
            *trimap = Trimap::from_rect(image.width(), image.height(), rect);
        }

        if trimap.dimensions() != image.dimensions() {
            return Err(LayerKitError::internal(format!(
                "trimap is {}x{} but image is {}x{}",
                trimap.width(),
                trimap.height(),
                image.width(),
                image.height()
            )));
        }

        let colors = pixel_colors(image);
        let background_samples = trimap.as_slice().iter().filter(|l| !l.is_foreground()).count();
        let foreground_samples = trimap.as_slice().len() - background_samples;
        if background_samples == 0 || foreground_samples == 0 {
            debug!(
                background_samples,
                foreground_samples, "Trimap lacks samples for one class, leaving it unchanged"
            );
            return Ok(());
        }

        let reuse = matches!(init, SolverInit::Continue) && models.is_trained();
        if !reuse {
            *models = initial_models(&colors, trimap);
        }

        let links = NeighbourLinks::compute(image, &colors);
        let mut components = vec![0u8; colors.len()];

        for iteration in 0..iterations {
            assign_components(&colors, trimap, models, &mut components);
            learn_models(&colors, trimap, &components, models);
            let mut graph = build_graph(image.width() as usize, &colors, trimap, models, &links);
            let flow = graph.max_flow();
            let changed = apply_cut(&graph, trimap);
            trace!(iteration, flow, changed, "GrabCut iteration");
        }

        Ok(())
    }
}

fn pixel_colors(image: &RgbImage) -> Vec<[f64; 3]> {
    image
        .pixels()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect()
}

/// Cluster each class's samples and fit one mixture per class
fn initial_models(colors: &[[f64; 3]], trimap: &Trimap) -> ColorModels {
    let (mut bg_samples, mut fg_samples) = (Vec::new(), Vec::new());
    for (color, label) in colors.iter().zip(trimap.as_slice()) {
        if label.is_foreground() {
            fg_samples.push(*color);
        } else {
            bg_samples.push(*color);
        }
    }

    let fit = |samples: &[[f64; 3]]| {
        let labels = kmeans(samples, COMPONENTS, KMEANS_ROUNDS);
        let mut learner = MixtureLearner::new();
        for (color, component) in samples.iter().zip(labels) {
            learner.add_sample(component, *color);
        }
        learner.finish()
    };

    ColorModels {
        background: fit(&bg_samples),
        foreground: fit(&fg_samples),
    }
}

fn assign_components(
    colors: &[[f64; 3]],
    trimap: &Trimap,
    models: &ColorModels,
    components: &mut [u8],
) {
    for ((color, label), component) in colors.iter().zip(trimap.as_slice()).zip(components) {
        let gmm = if label.is_foreground() {
            &models.foreground
        } else {
            &models.background
        };
        *component = gmm.most_likely_component(*color) as u8;
    }
}

fn learn_models(colors: &[[f64; 3]], trimap: &Trimap, components: &[u8], models: &mut ColorModels) {
    let mut background = MixtureLearner::new();
    let mut foreground = MixtureLearner::new();
    for ((color, label), &component) in colors.iter().zip(trimap.as_slice()).zip(components) {
        if label.is_foreground() {
            foreground.add_sample(usize::from(component), *color);
        } else {
            background.add_sample(usize::from(component), *color);
        }
    }
    models.background = background.finish();
    models.foreground = foreground.finish();
}

/// Precomputed smoothness capacities towards the left, up-left, up and up-right neighbours
struct NeighbourLinks {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

impl NeighbourLinks {
    fn compute(image: &RgbImage, colors: &[[f64; 3]]) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let beta = contrast_beta(width, height, colors);
        let diagonal_gamma = GAMMA / std::f64::consts::SQRT_2;

        let n = colors.len();
        let mut links = Self {
            left: vec![0.0; n],
            up_left: vec![0.0; n],
            up: vec![0.0; n],
            up_right: vec![0.0; n],
        };

        let weight = |a: &[f64; 3], b: &[f64; 3], gamma: f64| {
            gamma * (-beta * squared_distance(a, b)).exp()
        };

        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let color = &colors[i];
                if x > 0 {
                    links.left[i] = weight(color, &colors[i - 1], GAMMA);
                }
                if x > 0 && y > 0 {
                    links.up_left[i] = weight(color, &colors[i - width - 1], diagonal_gamma);
                }
                if y > 0 {
                    links.up[i] = weight(color, &colors[i - width], GAMMA);
                }
                if x + 1 < width && y > 0 {
                    links.up_right[i] = weight(color, &colors[i - width + 1], diagonal_gamma);
                }
            }
        }
        links
    }
}

/// Inverse of twice the mean squared colour difference between 8-neighbours
fn contrast_beta(width: usize, height: usize, colors: &[[f64; 3]]) -> f64 {
    let mut total = 0.0;
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let color = &colors[i];
            if x > 0 {
                total += squared_distance(color, &colors[i - 1]);
            }
            if x > 0 && y > 0 {
                total += squared_distance(color, &colors[i - width - 1]);
            }
            if y > 0 {
                total += squared_distance(color, &colors[i - width]);
            }
            if x + 1 < width && y > 0 {
                total += squared_distance(color, &colors[i - width + 1]);
            }
        }
    }

    let pairs = (4 * width * height) as f64 - (3 * width) as f64 - (3 * height) as f64 + 2.0;
    if total <= f64::EPSILON || pairs <= 0.0 {
        0.0
    } else {
        1.0 / (2.0 * total / pairs)
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Negative log-likelihood, bounded so that impossible colours stay finite
fn data_cost(probability: f64) -> f64 {
    -probability.max(f64::MIN_POSITIVE).ln()
}

fn build_graph(
    width: usize,
    colors: &[[f64; 3]],
    trimap: &Trimap,
    models: &ColorModels,
    links: &NeighbourLinks,
) -> FlowGraph {
    let n = colors.len();
    let height = if width == 0 { 0 } else { n / width };
    let edge_count = 2 * (4 * n).saturating_sub(3 * (width + height)) + 4;
    let mut graph = FlowGraph::with_capacity(n, edge_count);

    for (i, (color, label)) in colors.iter().zip(trimap.as_slice()).enumerate() {
        let vertex = graph.add_vertex();
        let (from_source, to_sink) = match label {
            TrimapLabel::ProbableBackground | TrimapLabel::ProbableForeground => (
                data_cost(models.background.probability(*color)),
                data_cost(models.foreground.probability(*color)),
            ),
            TrimapLabel::Background => (0.0, LAMBDA),
            TrimapLabel::Foreground => (LAMBDA, 0.0),
        };
        graph.add_term_weights(vertex, from_source, to_sink);

        let x = i % width;
        let y = i / width;
        if x > 0 {
            graph.add_edges(vertex, vertex - 1, links.left[i], links.left[i]);
        }
        if x > 0 && y > 0 {
            graph.add_edges(vertex, vertex - width - 1, links.up_left[i], links.up_left[i]);
        }
        if y > 0 {
            graph.add_edges(vertex, vertex - width, links.up[i], links.up[i]);
        }
        if x + 1 < width && y > 0 {
            graph.add_edges(vertex, vertex - width + 1, links.up_right[i], links.up_right[i]);
        }
    }
    graph
}

/// Rewrite probable labels from the cut; returns how many changed
fn apply_cut(graph: &FlowGraph, trimap: &mut Trimap) -> usize {
    let mut changed = 0;
    for (i, label) in trimap.as_mut_slice().iter_mut().enumerate() {
        if !label.is_probable() {
            continue;
        }
        let updated = if graph.in_source_segment(i) {
            TrimapLabel::ProbableForeground
        } else {
            TrimapLabel::ProbableBackground
        };
        if *label != updated {
            *label = updated;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;
    use image::Rgb;

    fn square_scene() -> RgbImage {
        RgbImage::from_fn(80, 60, |x, y| {
            if (30..50).contains(&x) && (20..40).contains(&y) {
                Rgb([20, 40, 200])
            } else {
                Rgb([230, 220, 210])
            }
        })
    }

    #[test]
    fn test_rect_init_recovers_square() {
        let image = square_scene();
        let mut trimap = Trimap::filled(80, 60, TrimapLabel::Background);
        let mut models = ColorModels::default();

        GrabCutSolver::new()
            .run(&image, &mut trimap, &mut models, SolverInit::Rect(Rect::new(5, 5, 70, 50)), 3)
            .unwrap();

        for (x, y, pixel) in image.enumerate_pixels() {
            let inside = pixel[2] == 200;
            assert_eq!(trimap.get(x, y).is_foreground(), inside, "pixel ({x}, {y})");
        }
        assert!(models.is_trained());
    }

    #[test]
    fn test_definite_labels_are_never_rewritten() {
        let image = square_scene();
        let mut trimap = Trimap::filled(80, 60, TrimapLabel::ProbableBackground);
        trimap.set(0, 0, TrimapLabel::Background);
        trimap.set(40, 30, TrimapLabel::ProbableForeground);
        trimap.set(1, 1, TrimapLabel::Foreground);

        let mut models = ColorModels::default();
        GrabCutSolver::new()
            .run(&image, &mut trimap, &mut models, SolverInit::Mask, 2)
            .unwrap();

        assert_eq!(trimap.get(0, 0), TrimapLabel::Background);
        assert_eq!(trimap.get(1, 1), TrimapLabel::Foreground);
    }

    #[test]
    fn test_continue_reuses_trained_models() {
        let image = square_scene();
        let mut trimap = Trimap::filled(80, 60, TrimapLabel::Background);
        let mut models = ColorModels::default();
        let solver = GrabCutSolver::new();
        solver
            .run(&image, &mut trimap, &mut models, SolverInit::Rect(Rect::new(5, 5, 70, 50)), 2)
            .unwrap();
        let before = trimap.clone();

        solver
            .run(&image, &mut trimap, &mut models, SolverInit::Continue, 2)
            .unwrap();
        assert_eq!(trimap, before);
    }

    #[test]
    fn test_missing_class_leaves_trimap_unchanged() {
        let image = square_scene();
        let mut trimap = Trimap::filled(80, 60, TrimapLabel::ProbableBackground);
        let mut models = ColorModels::default();
        GrabCutSolver::new()
            .run(&image, &mut trimap, &mut models, SolverInit::Mask, 3)
            .unwrap();
        assert_eq!(trimap.count(TrimapLabel::ProbableBackground), 80 * 60);
    }

    #[test]
    fn test_dimension_mismatch_is_internal_error() {
        let image = square_scene();
        let mut trimap = Trimap::filled(10, 10, TrimapLabel::ProbableForeground);
        let mut models = ColorModels::default();
        let err = GrabCutSolver::new()
            .run(&image, &mut trimap, &mut models, SolverInit::Mask, 1)
            .unwrap_err();
        assert!(matches!(err, LayerKitError::Internal(_)));
    }
}

//! Shared fixtures for the integration tests
#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use layerkit::{
    mask::Trimap,
    segmentation::{ColorModels, SegmentationSolver, SolverInit},
    GrabCutConfig, Rect, Result,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Plain white background with one black rectangle
pub fn square_scene(width: u32, height: u32, square: Rect) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if square.contains(x, y) {
            BLACK
        } else {
            WHITE
        }
    })
}

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("PNG encoding of a test image");
    bytes.into_inner()
}

pub fn config(max_concurrent: usize, queue_timeout: Duration) -> GrabCutConfig {
    GrabCutConfig::builder()
        .max_concurrent(max_concurrent)
        .queue_timeout(queue_timeout)
        .build()
        .expect("valid test configuration")
}

/// Solver that only sleeps, tracking how many runs overlap
#[derive(Debug, Default)]
pub struct SlowSolver {
    pub delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowSolver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SegmentationSolver for SlowSolver {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn run(
        &self,
        _image: &RgbImage,
        trimap: &mut Trimap,
        _models: &mut ColorModels,
        init: SolverInit,
        _iterations: u32,
    ) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if let SolverInit::Rect(rect) = init {
            let (width, height) = trimap.dimensions();
            *trimap = Trimap::from_rect(width, height, rect);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct PanickingSolver;

impl SegmentationSolver for PanickingSolver {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn run(
        &self,
        _image: &RgbImage,
        _trimap: &mut Trimap,
        _models: &mut ColorModels,
        _init: SolverInit,
        _iterations: u32,
    ) -> Result<()> {
        panic!("solver failure injected by test");
    }
}

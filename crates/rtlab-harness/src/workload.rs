//! Synthetic CPU workloads.
//!
//! Two cost profiles:
//! - [`EdgeWorkload`]: a Canny-style edge detector over a generated grayscale
//!   image (blur, Sobel, non-maximum suppression, hysteresis). Heavy and
//!   memory-touching.
//! - [`BusyWorkload`]: a tight integer mixing loop. Light per iteration,
//!   cache-resident.
//!
//! Both are pure computation; results only feed `black_box` so the optimizer
//! cannot drop the work.

use crate::task::{Runnable, TaskSource, TimedTask};
use rtlab_common::config::{ExperimentEntry, TaskKind, WorkloadConfig};
use std::collections::VecDeque;
use std::hint::black_box;

/// Pixel value of a confirmed edge.
pub const EDGE: u8 = 255;
/// Default hysteresis thresholds on gradient magnitude.
const LOW_THRESHOLD: f32 = 40.0;
const HIGH_THRESHOLD: f32 = 100.0;

/// 8-bit grayscale image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl GrayImage {
    /// Wrap raw pixels.
    ///
    /// # Panics
    ///
    /// Panics if `pixels.len() != width * height`.
    #[must_use]
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), width * height, "pixel buffer size mismatch");
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Deterministic test card: a bright disc and bars on a dark, noisy field.
    #[must_use]
    pub fn synthetic(width: usize, height: usize, seed: u64) -> Self {
        let mut state = seed | 1;
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let radius = width.min(height) as f32 / 3.0;

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                // xorshift64 noise
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let noise = (state % 24) as u8;

                let (dx, dy) = (x as f32 - cx, y as f32 - cy);
                let inside_disc = dx * dx + dy * dy < radius * radius;
                let on_bar = (x / 32) % 4 == 0;
                let base = match (inside_disc, on_bar) {
                    (true, _) => 200,
                    (false, true) => 120,
                    (false, false) => 30,
                };
                pixels.push(base + noise);
            }
        }
        Self::from_pixels(width, height, pixels)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw pixels.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel with coordinates clamped to the border.
    fn at(&self, x: isize, y: isize) -> u8 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.pixels[y * self.width + x]
    }
}

/// 5x5 binomial blur, applied as two separable passes.
#[must_use]
pub fn gaussian_blur(image: &GrayImage) -> GrayImage {
    const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
    let (w, h) = (image.width, image.height);

    let horizontal: Vec<u8> = (0..h)
        .flat_map(|y| {
            (0..w).map(move |x| {
                let sum: u32 = KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| {
                        c * u32::from(image.at(x as isize + k as isize - 2, y as isize))
                    })
                    .sum();
                (sum / 16) as u8
            })
        })
        .collect();
    let horizontal = GrayImage::from_pixels(w, h, horizontal);

    let vertical: Vec<u8> = (0..h)
        .flat_map(|y| {
            let horizontal = &horizontal;
            (0..w).map(move |x| {
                let sum: u32 = KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| {
                        c * u32::from(horizontal.at(x as isize, y as isize + k as isize - 2))
                    })
                    .sum();
                (sum / 16) as u8
            })
        })
        .collect();
    GrayImage::from_pixels(w, h, vertical)
}

/// Sobel gradient magnitude and direction quantized to 0/45/90/135 degrees.
fn sobel(image: &GrayImage) -> (Vec<f32>, Vec<u8>) {
    let (w, h) = (image.width, image.height);
    let mut magnitude = vec![0.0f32; w * h];
    let mut direction = vec![0u8; w * h];

    for y in 0..h as isize {
        for x in 0..w as isize {
            let p = |dx: isize, dy: isize| i32::from(image.at(x + dx, y + dy));
            let gx = p(1, -1) + 2 * p(1, 0) + p(1, 1) - p(-1, -1) - 2 * p(-1, 0) - p(-1, 1);
            let gy = p(-1, 1) + 2 * p(0, 1) + p(1, 1) - p(-1, -1) - 2 * p(0, -1) - p(1, -1);

            let idx = y as usize * w + x as usize;
            magnitude[idx] = (gx as f32).hypot(gy as f32);

            let angle = (gy as f32).atan2(gx as f32).to_degrees().rem_euclid(180.0);
            direction[idx] = match angle {
                a if !(22.5..157.5).contains(&a) => 0,
                a if a < 67.5 => 1,
                a if a < 112.5 => 2,
                _ => 3,
            };
        }
    }
    (magnitude, direction)
}

/// Full edge detection pipeline; returns a mask where edges are [`EDGE`].
#[must_use]
pub fn detect_edges(image: &GrayImage) -> GrayImage {
    let (w, h) = (image.width, image.height);
    let blurred = gaussian_blur(image);
    let (magnitude, direction) = sobel(&blurred);

    let mag = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    // Non-maximum suppression + double threshold
    const WEAK: u8 = 1;
    let mut mask = vec![0u8; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let idx = y as usize * w + x as usize;
            let m = magnitude[idx];
            let (dx, dy) = match direction[idx] {
                0 => (1, 0),
                1 => (1, 1),
                2 => (0, 1),
                _ => (-1, 1),
            };
            if m < mag(x + dx, y + dy) || m < mag(x - dx, y - dy) {
                continue;
            }
            if m >= HIGH_THRESHOLD {
                mask[idx] = EDGE;
            } else if m >= LOW_THRESHOLD {
                mask[idx] = WEAK;
            }
        }
    }

    // Hysteresis: promote weak pixels connected to strong ones
    let mut queue: VecDeque<usize> = (0..mask.len()).filter(|&i| mask[i] == EDGE).collect();
    while let Some(idx) = queue.pop_front() {
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if mask[n] == WEAK {
                    mask[n] = EDGE;
                    queue.push_back(n);
                }
            }
        }
    }
    for px in &mut mask {
        if *px == WEAK {
            *px = 0;
        }
    }

    GrayImage::from_pixels(w, h, mask)
}

/// Integer mixing loop; returns the final accumulator.
#[must_use]
pub fn busy_loop(iterations: u64) -> u64 {
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in 0..iterations {
        acc = black_box(acc.rotate_left(5) ^ i).wrapping_mul(0x0000_0100_0000_01B3);
    }
    acc
}

/// Heavy workload: repeated edge detection over a synthetic image.
#[derive(Debug, Clone)]
pub struct EdgeWorkload {
    image: GrayImage,
    passes: u32,
}

impl EdgeWorkload {
    /// Build the workload; the input image is generated up front so the
    /// timed section is pure processing.
    #[must_use]
    pub fn new(config: &WorkloadConfig) -> Self {
        Self {
            image: GrayImage::synthetic(
                config.image_width.max(1),
                config.image_height.max(1),
                0x5EED,
            ),
            passes: config.edge_passes,
        }
    }
}

impl Runnable for EdgeWorkload {
    fn run(&mut self) {
        for _ in 0..self.passes {
            black_box(detect_edges(black_box(&self.image)));
        }
    }
}

/// Light workload: the busy loop.
#[derive(Debug, Clone, Copy)]
pub struct BusyWorkload {
    iterations: u64,
}

impl BusyWorkload {
    /// Build the workload.
    #[must_use]
    pub fn new(config: &WorkloadConfig) -> Self {
        Self {
            iterations: config.busy_iterations,
        }
    }
}

impl Runnable for BusyWorkload {
    fn run(&mut self) {
        black_box(busy_loop(self.iterations));
    }
}

/// Default [`TaskSource`]: maps each entry's kind onto a workload.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadProvider {
    config: WorkloadConfig,
}

impl WorkloadProvider {
    /// Provider sized by `config`.
    #[must_use]
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }
}

impl TaskSource for WorkloadProvider {
    fn task_for(&self, entry: &ExperimentEntry) -> TimedTask {
        match entry.task {
            TaskKind::Edge => {
                TimedTask::new(entry.app_id, entry.task, EdgeWorkload::new(&self.config))
            }
            TaskKind::Busy => {
                TimedTask::new(entry.app_id, entry.task, BusyWorkload::new(&self.config))
            }
        }
    }
}

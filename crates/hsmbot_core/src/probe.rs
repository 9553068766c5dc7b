//! Grasp verification probe.
//!
//! Looks for the thick dark band of a cube marker in a handful of image
//! columns. Each column gets its own black threshold from an adaptive
//! two-cluster split of its pixel intensities, then the first dark run below
//! the bright margin is measured.

use std::ops::Range;

use crate::error::{CoreError, Domain, ErrorKind, Result};

/// Row-major 8-bit grayscale image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(CoreError::error()
                .domain(Domain::Probe)
                .kind(ErrorKind::InvalidArgument)
                .msgf(format_args!(
                    "image buffer has {} pixels, expected {}x{}",
                    pixels.len(),
                    width,
                    height
                ))
                .build());
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * self.width + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        self.pixels[row * self.width + col] = value;
    }

    /// Paint rows `rows` of every column with `value`.
    pub fn fill_rows(&mut self, rows: Range<usize>, value: u8) {
        let end = rows.end.min(self.height);
        for row in rows.start..end {
            let base = row * self.width;
            self.pixels[base..base + self.width].fill(value);
        }
    }

    pub fn column(&self, col: usize) -> Vec<u8> {
        (0..self.height).map(|row| self.get(row, col)).collect()
    }
}

/// Outcome of the two-cluster split of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSplit {
    /// Brightest member of the dark cluster.
    pub black_threshold: f64,
    pub black_mean: f64,
    pub black_count: usize,
    /// Darkest member of the bright cluster.
    pub white_min: f64,
    pub white_mean: f64,
    pub white_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    sum: f64,
    count: usize,
    extreme: f64,
}

impl Cluster {
    fn seed(value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            extreme: value,
        }
    }

    // count starts at 1 and only grows
    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }
}

/// Split `samples` into a dark and a bright cluster grown from the extremes.
///
/// The cursor whose next value lies closer to its cluster's current extreme
/// advances first, and the value joins whichever cluster mean is nearer.
/// The element where the cursors meet is left unclaimed. Returns `None` for an
/// empty input.
pub fn split_clusters(samples: &[u8]) -> Option<ClusterSplit> {
    let mut px: Vec<f64> = samples.iter().map(|&p| f64::from(p)).collect();
    px.sort_by(f64::total_cmp);

    let n = px.len();
    let (first, last) = (*px.first()?, *px.last()?);
    let mut black = Cluster::seed(first);
    let mut white = Cluster::seed(last);

    let mut lo = 1;
    let mut hi = n.saturating_sub(2);
    while lo < hi {
        let i = if (black.extreme - px[lo]).abs() < (white.extreme - px[hi]).abs() {
            lo += 1;
            lo - 1
        } else {
            hi -= 1;
            hi + 1
        };

        let val = px[i];
        if (val - black.mean()).abs() < (val - white.mean()).abs() {
            black.push(val);
            black.extreme = black.extreme.max(val);
        } else {
            white.push(val);
            white.extreme = white.extreme.min(val);
        }
    }

    Some(ClusterSplit {
        black_threshold: black.extreme,
        black_mean: black.mean(),
        black_count: black.count,
        white_min: white.extreme,
        white_mean: white.mean(),
        white_count: white.count,
    })
}

/// Length of the first dark run in `column[rows]`, or `None` when not found.
///
/// Not found means: the range is empty, the bright margin covers the whole
/// range, or the dark run ends within `edge_margin` rows of the range end.
pub fn probe_column(column: &[u8], rows: Range<usize>, edge_margin: usize) -> Option<usize> {
    let end = rows.end.min(column.len());
    let start = rows.start;
    if start >= end {
        return None;
    }

    let split = split_clusters(&column[start..end])?;
    let thresh = split.black_threshold;
    let is_dark = |row: usize| f64::from(column[row]) <= thresh;

    let mut index = start;
    while index < end && !is_dark(index) {
        index += 1;
    }
    if index == end {
        return None;
    }

    let mut run = 0;
    while index < end && is_dark(index) {
        run += 1;
        index += 1;
    }

    tracing::trace!(
        white_min = split.white_min,
        white_mean = split.white_mean,
        black_mean = split.black_mean,
        black_thresh = thresh,
        run,
        "probed column"
    );

    if index + edge_margin >= end {
        None
    } else {
        Some(run)
    }
}

/// Sampling plan and acceptance window of a verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Sampled columns: `columns.step_by(column_step)`.
    pub columns: Range<usize>,
    pub column_step: usize,
    pub rows: Range<usize>,
    pub min_run: usize,
    pub max_run: usize,
    /// The pass fails once this many columns are bad.
    pub max_bad_columns: usize,
    pub edge_margin: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            columns: 100..220,
            column_step: 20,
            rows: 0..100,
            min_run: 20,
            max_run: 32,
            max_bad_columns: 2,
            edge_margin: 5,
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &'static str| {
            Err(CoreError::error()
                .domain(Domain::Config)
                .kind(ErrorKind::InvalidArgument)
                .msg(msg)
                .build())
        };
        if self.column_step == 0 {
            return bad("probe column step must be positive");
        }
        if self.columns.is_empty() || self.rows.is_empty() {
            return bad("probe columns and rows must be non-empty");
        }
        if self.min_run > self.max_run {
            return bad("probe run window is inverted");
        }
        if self.max_bad_columns == 0 {
            return bad("probe max_bad_columns must be at least 1");
        }
        Ok(())
    }

    pub fn sample_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns.clone().step_by(self.column_step)
    }
}

/// One sampled column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSample {
    pub column: usize,
    pub run: Option<usize>,
    pub accepted: bool,
}

/// Result of a full verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraspVerdict {
    pub samples: Vec<ColumnSample>,
    pub bad_columns: usize,
    pub passed: bool,
}

/// Sample every configured column and vote.
pub fn verify_grasp(image: &GrayImage, config: &ProbeConfig) -> Result<GraspVerdict> {
    config.validate()?;
    if config.columns.end > image.width() || config.rows.end > image.height() {
        return Err(CoreError::warn()
            .domain(Domain::Probe)
            .kind(ErrorKind::InvalidArgument)
            .msgf(format_args!(
                "probe window exceeds {}x{} image",
                image.width(),
                image.height()
            ))
            .build());
    }

    let samples: Vec<ColumnSample> = config
        .sample_columns()
        .map(|col| {
            let run = probe_column(&image.column(col), config.rows.clone(), config.edge_margin);
            let accepted = run.is_some_and(|r| (config.min_run..=config.max_run).contains(&r));
            tracing::debug!(col, ?run, accepted, "grasp probe column");
            ColumnSample {
                column: col,
                run,
                accepted,
            }
        })
        .collect();

    let bad_columns = samples.iter().filter(|s| !s.accepted).count();
    let passed = bad_columns < config.max_bad_columns;

    Ok(GraspVerdict {
        samples,
        bad_columns,
        passed,
    })
}

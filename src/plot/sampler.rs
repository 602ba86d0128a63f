//! Domain sweeps.
//!
//! A [`Sweep`] is a finite, restartable enumeration of the sampling domain of
//! one expression. Ordering is part of the contract: grids are row-major with
//! the first axis outer, lattices run x outer, y middle, z inner. Index buffers
//! built in `mesh` assume exactly this order.

use super::params::{Bounds, ParameterError, Range};

/// Upper bound on samples in a single sweep.
pub const MAX_SWEEP_SAMPLES: usize = 4_000_000;

const COUNT_EPSILON: f64 = 1e-9;

/// One point of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    /// Position in the sweep, `0..sweep.len()`.
    pub ordinal: usize,
    /// Integer coordinates per axis; unused axes are 0.
    pub grid: [usize; 3],
    /// Sweep variable values in the order of [`Sweep::variables`]; unused slots are 0.
    pub values: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sweep {
    /// `(resolution + 1)²` samples over two axes.
    Grid {
        variables: [&'static str; 2],
        first: Range,
        second: Range,
        resolution: u32,
    },
    /// Fixed-step sweep over `t`.
    Line { t: Range, step: f64, count: usize },
    /// Unit-step lattice over `x, y, z`.
    Lattice {
        x: Range,
        y: Range,
        z: Range,
        counts: [usize; 3],
    },
    /// Exactly one sample, no sweep variables.
    Single,
}

/// Build the sweep described by `bounds`.
///
/// Sample counts are checked against [`MAX_SWEEP_SAMPLES`] in floating point
/// before anything is converted to `usize`.
pub fn sample(bounds: &Bounds) -> Result<Sweep, ParameterError> {
    let requested = match *bounds {
        Bounds::Surface { resolution, .. } | Bounds::ParametricSurface { resolution, .. } => {
            (f64::from(resolution) + 1.0).powi(2)
        }
        Bounds::ParametricLine { t, step } => line_count(t, step),
        Bounds::VectorField { x, y, z } => {
            lattice_axis_count(x) * lattice_axis_count(y) * lattice_axis_count(z)
        }
        Bounds::Point => 1.0,
    };
    if requested > MAX_SWEEP_SAMPLES as f64 {
        return Err(ParameterError::TooManySamples {
            // saturating float-to-int cast
            requested: requested as usize,
            limit: MAX_SWEEP_SAMPLES,
        });
    }

    let sweep = match *bounds {
        Bounds::Surface { x, y, resolution } => Sweep::Grid {
            variables: ["x", "y"],
            first: x,
            second: y,
            resolution,
        },
        Bounds::ParametricSurface { u, v, resolution } => Sweep::Grid {
            variables: ["u", "v"],
            first: u,
            second: v,
            resolution,
        },
        Bounds::ParametricLine { t, step } => Sweep::Line {
            t,
            step,
            count: line_sample_count(t, step),
        },
        Bounds::VectorField { x, y, z } => Sweep::Lattice {
            x,
            y,
            z,
            counts: [lattice_count(x), lattice_count(y), lattice_count(z)],
        },
        Bounds::Point => Sweep::Single,
    };
    Ok(sweep)
}

/// `ceil((t1 - t0) / step) + 1`, without over-counting spans that are an
/// exact multiple of `step` up to rounding noise. Saturates at `usize::MAX`.
#[must_use]
pub fn line_sample_count(t: Range, step: f64) -> usize {
    line_count(t, step) as usize
}

/// Integer points in `[min, max]` stepping by one from `min`. Saturates at
/// `usize::MAX`.
#[must_use]
pub fn lattice_count(range: Range) -> usize {
    lattice_axis_count(range) as usize
}

fn line_count(t: Range, step: f64) -> f64 {
    let steps = t.span() / step;
    let nearest = steps.round();
    let whole = if (steps - nearest).abs() <= COUNT_EPSILON * nearest.max(1.0) {
        nearest
    } else {
        steps.ceil()
    };
    whole.max(0.0) + 1.0
}

fn lattice_axis_count(range: Range) -> f64 {
    (range.span() + COUNT_EPSILON).floor().max(0.0) + 1.0
}

/// Row-major vertex index of grid cell corner `(i, j)`.
#[must_use]
pub const fn grid_index(i: usize, j: usize, resolution: usize) -> usize {
    i * (resolution + 1) + j
}

/// Inverse of [`grid_index`].
#[must_use]
pub const fn grid_coords(index: usize, resolution: usize) -> (usize, usize) {
    (index / (resolution + 1), index % (resolution + 1))
}

impl Sweep {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Grid { resolution, .. } => {
                let side = *resolution as usize + 1;
                side.saturating_mul(side)
            }
            Self::Line { count, .. } => *count,
            Self::Lattice { counts, .. } => counts[0].saturating_mul(counts[1]).saturating_mul(counts[2]),
            Self::Single => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names bound to [`SamplePoint::values`], in slot order.
    #[must_use]
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            Self::Grid { variables, .. } => {
                if variables[0] == "u" {
                    &["u", "v"]
                } else {
                    &["x", "y"]
                }
            }
            Self::Line { .. } => &["t"],
            Self::Lattice { .. } => &["x", "y", "z"],
            Self::Single => &[],
        }
    }

    /// Sample at `ordinal`; `None` past the end.
    #[must_use]
    pub fn point(&self, ordinal: usize) -> Option<SamplePoint> {
        if ordinal >= self.len() {
            return None;
        }
        let point = match self {
            Self::Grid {
                first,
                second,
                resolution,
                ..
            } => {
                let res = *resolution as usize;
                let (i, j) = grid_coords(ordinal, res);
                let du = first.span() / f64::from(*resolution);
                let dv = second.span() / f64::from(*resolution);
                SamplePoint {
                    ordinal,
                    grid: [i, j, 0],
                    values: [first.min + i as f64 * du, second.min + j as f64 * dv, 0.0],
                }
            }
            Self::Line { t, step, .. } => SamplePoint {
                ordinal,
                grid: [ordinal, 0, 0],
                values: [(t.min + ordinal as f64 * step).min(t.max), 0.0, 0.0],
            },
            Self::Lattice { x, y, z, counts } => {
                let plane = counts[1] * counts[2];
                let i = ordinal / plane;
                let j = (ordinal % plane) / counts[2];
                let k = ordinal % counts[2];
                SamplePoint {
                    ordinal,
                    grid: [i, j, k],
                    values: [x.min + i as f64, y.min + j as f64, z.min + k as f64],
                }
            }
            Self::Single => SamplePoint {
                ordinal,
                grid: [0; 3],
                values: [0.0; 3],
            },
        };
        Some(point)
    }

    /// Restartable iterator; every call starts from the first sample.
    #[must_use]
    pub fn iter(&self) -> SweepIter<'_> {
        SweepIter {
            sweep: self,
            next: 0,
            len: self.len(),
        }
    }
}

impl<'a> IntoIterator for &'a Sweep {
    type Item = SamplePoint;
    type IntoIter = SweepIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct SweepIter<'a> {
    sweep: &'a Sweep,
    next: usize,
    len: usize,
}

impl Iterator for SweepIter<'_> {
    type Item = SamplePoint;

    fn next(&mut self) -> Option<Self::Item> {
        let point = self.sweep.point(self.next)?;
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SweepIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(res: u32) -> Bounds {
        Bounds::Surface {
            x: Range::new(-1.0, 1.0),
            y: Range::new(-1.0, 1.0),
            resolution: res,
        }
    }

    #[test]
    fn grid_has_res_plus_one_squared_samples() {
        for res in [1, 2, 7, 40] {
            let sweep = sample(&surface(res)).unwrap();
            let side = res as usize + 1;
            assert_eq!(sweep.len(), side * side);
            assert_eq!(sweep.iter().count(), side * side);
        }
    }

    #[test]
    fn grid_is_row_major_with_inclusive_endpoints() {
        let sweep = sample(&surface(2)).unwrap();
        let points: Vec<_> = sweep.iter().collect();
        assert_eq!(points[0].values[..2], [-1.0, -1.0]);
        assert_eq!(points[1].values[..2], [-1.0, 0.0]);
        assert_eq!(points[3].values[..2], [0.0, -1.0]);
        assert_eq!(points[4].values[..2], [0.0, 0.0]);
        assert_eq!(points[8].values[..2], [1.0, 1.0]);
        assert_eq!(points[5].grid, [1, 2, 0]);
    }

    #[test]
    fn grid_index_round_trips() {
        for res in [1usize, 3, 10] {
            for i in 0..=res {
                for j in 0..=res {
                    let index = grid_index(i, j, res);
                    assert!(index < (res + 1) * (res + 1));
                    assert_eq!(grid_coords(index, res), (i, j));
                }
            }
        }
    }

    #[test]
    fn line_count_over_two_pi() {
        let t = Range::new(0.0, std::f64::consts::TAU);
        assert_eq!(line_sample_count(t, 0.01), 630);
    }

    #[test]
    fn line_count_does_not_overcount_exact_multiples() {
        assert_eq!(line_sample_count(Range::new(0.0, 10.0), 0.01), 1001);
        assert_eq!(line_sample_count(Range::new(0.0, 1.0), 0.25), 5);
        assert_eq!(line_sample_count(Range::new(2.0, 2.0), 0.01), 1);
    }

    #[test]
    fn line_last_sample_is_clamped_to_end() {
        let t = Range::new(0.0, 0.025);
        let sweep = sample(&Bounds::ParametricLine { t, step: 0.01 }).unwrap();
        let values: Vec<f64> = sweep.iter().map(|p| p.values[0]).collect();
        assert_eq!(values.len(), 4);
        assert_eq!(*values.last().unwrap(), 0.025);
    }

    #[test]
    fn lattice_is_x_outer_z_inner() {
        let bounds = Bounds::VectorField {
            x: Range::new(0.0, 1.0),
            y: Range::new(0.0, 1.0),
            z: Range::new(0.0, 2.0),
        };
        let sweep = sample(&bounds).unwrap();
        assert_eq!(sweep.len(), 2 * 2 * 3);
        let points: Vec<_> = sweep.iter().collect();
        assert_eq!(points[0].values, [0.0, 0.0, 0.0]);
        assert_eq!(points[1].values, [0.0, 0.0, 1.0]);
        assert_eq!(points[3].values, [0.0, 1.0, 0.0]);
        assert_eq!(points[6].values, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn degenerate_lattice_has_one_point() {
        let zero = Range::new(0.0, 0.0);
        let sweep = sample(&Bounds::VectorField {
            x: zero,
            y: zero,
            z: zero,
        })
        .unwrap();
        assert_eq!(sweep.len(), 1);
    }

    #[test]
    fn lattice_counts_floor_fractional_spans() {
        assert_eq!(lattice_count(Range::new(-5.0, 5.0)), 11);
        assert_eq!(lattice_count(Range::new(0.0, 2.5)), 3);
    }

    #[test]
    fn sweep_restarts() {
        let sweep = sample(&surface(3)).unwrap();
        let first: Vec<_> = sweep.iter().collect();
        let second: Vec<_> = sweep.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn counts_saturate_instead_of_overflowing() {
        assert_eq!(line_sample_count(Range::new(0.0, 1.0e300), 1.0e-300), usize::MAX);
        assert_eq!(lattice_count(Range::new(-1.0e300, 1.0e300)), usize::MAX);
    }

    #[test]
    fn huge_lattices_are_rejected_before_counting() {
        let wide = Range::new(0.0, 1.0e7);
        let err = sample(&Bounds::VectorField {
            x: wide,
            y: wide,
            z: wide,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ParameterError::TooManySamples { limit: MAX_SWEEP_SAMPLES, .. }
        ));

        // every axis fits in usize, the product does not
        let axis = Range::new(0.0, 4.0e6);
        assert!(sample(&Bounds::VectorField { x: axis, y: axis, z: axis }).is_err());
    }

    #[test]
    fn huge_sweeps_are_rejected() {
        let err = sample(&Bounds::ParametricLine {
            t: Range::new(0.0, 1.0e9),
            step: 0.01,
        })
        .unwrap_err();
        assert!(matches!(err, ParameterError::TooManySamples { .. }));

        let err = sample(&Bounds::ParametricLine {
            t: Range::new(0.0, 1.0e30),
            step: 0.01,
        })
        .unwrap_err();
        assert!(matches!(err, ParameterError::TooManySamples { .. }));
    }
}

//! Expression-to-geometry pipeline: classification, sweeps, builders and the
//! geometry cache.
//!
//! Everything in this module is independent of the expression text; the
//! document layer feeds it a classified kind, resolved bounds and a
//! [`SampleSource`] to evaluate.

mod arrows;
mod cache;
mod core;
mod diagnostics;
mod kind;
mod marker;
mod mesh;
mod params;
mod sampler;
mod tube;

pub use arrows::{
    ArrowField, ArrowInstance, ArrowStyle, ArrowTemplate, ColorScale, build_arrow_template,
    intensity_color,
};
pub use cache::{
    CachedGeometry, GeometryCache, GeometryStyle, GroupHandle, PlotGeometry, TopologyCache,
    TopologyCacheStats, UpdateKind, UpdateOutcome, UpdateRequest,
};
pub use core::{Point3, Quaternion, Vec3, flip_axes};
pub use diagnostics::BuildDiagnostics;
pub use kind::{
    ExpressionForm, ExpressionKind, ExpressionShape, SWEEP_VARIABLES, classify,
    is_sweep_variable,
};
pub use marker::{PointMarker, SphereTemplate, build_sphere_template};
pub use mesh::{
    GridMesh, GridTopology, MeshTemplate, compute_vertex_normals, grid_indices, grid_uvs,
};
pub use params::{
    Bounds, BoundsSignature, MAX_RESOLUTION, PARAMETER_NAMES, ParameterError, PlotDefaults,
    PlotParameters, Range,
};
pub use sampler::{
    MAX_SWEEP_SAMPLES, SamplePoint, Sweep, SweepIter, grid_coords, grid_index, lattice_count,
    line_sample_count, sample,
};
pub use tube::{TubeMesh, TubeStyle, TubeTopology, hold_degenerate_samples, smooth_path};

/// Per-sample evaluation failure. Never fatal for a build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error("component {component} is not finite ({value})")]
    NonFinite { component: usize, value: f64 },
    #[error("expected {expected} components, got {got}")]
    ArityMismatch { expected: usize, got: usize },
}

/// Build failure; the expression ends up without geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("parametric line needs at least 2 finite samples, got {finite}")]
    LineTooShort { finite: usize },
    #[error("point evaluated to a non-finite position: {0}")]
    NonFinitePoint(SampleError),
    #[error("{kind} expressions cannot be plotted")]
    NotPlottable { kind: ExpressionKind },
    #[error("{kind} expressions need {expected} components, got {got}")]
    WrongArity {
        kind: ExpressionKind,
        expected: usize,
        got: usize,
    },
    #[error("bounds do not match a {kind} expression")]
    BoundsMismatch { kind: ExpressionKind },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Something that can be evaluated at a sample.
///
/// `bindings` holds the sweep variables of the current sample. Implementations
/// write `arity()` components into the front of `out`.
pub trait SampleSource {
    fn arity(&self) -> usize;

    fn evaluate(&self, bindings: &[(&str, f64)], out: &mut [f64; 3]) -> Result<(), SampleError>;

    /// Evaluate and check that every produced component is finite.
    fn evaluate_finite(
        &self,
        bindings: &[(&str, f64)],
        out: &mut [f64; 3],
    ) -> Result<(), SampleError> {
        self.evaluate(bindings, out)?;
        for (component, value) in out.iter().take(self.arity()).enumerate() {
            if !value.is_finite() {
                return Err(SampleError::NonFinite {
                    component,
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

/// Evaluate `source` at `point` of `sweep`, binding the sweep variables.
pub(crate) fn evaluate_at(
    source: &dyn SampleSource,
    sweep: &Sweep,
    point: &SamplePoint,
    out: &mut [f64; 3],
) -> Result<(), SampleError> {
    let mut bindings: [(&str, f64); 3] = [("", 0.0); 3];
    let names = sweep.variables();
    for (slot, name) in names.iter().enumerate() {
        bindings[slot] = (*name, point.values[slot]);
    }
    source.evaluate_finite(&bindings[..names.len()], out)
}

/// Closure-backed [`SampleSource`], handy for tests and host-side callbacks.
pub struct FnSource<F> {
    arity: usize,
    f: F,
}

impl<F> FnSource<F>
where
    F: Fn(&[(&str, f64)]) -> Result<[f64; 3], SampleError>,
{
    pub fn new(arity: usize, f: F) -> Self {
        Self { arity, f }
    }
}

impl<F> SampleSource for FnSource<F>
where
    F: Fn(&[(&str, f64)]) -> Result<[f64; 3], SampleError>,
{
    fn arity(&self) -> usize {
        self.arity
    }

    fn evaluate(&self, bindings: &[(&str, f64)], out: &mut [f64; 3]) -> Result<(), SampleError> {
        *out = (self.f)(bindings)?;
        Ok(())
    }
}

/// Look up a binding by name; missing names read as 0.
#[must_use]
pub fn binding(bindings: &[(&str, f64)], name: &str) -> f64 {
    bindings
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map_or(0.0, |(_, value)| *value)
}

//! Geometry caching for plotted expressions.
//!
//! Two layers:
//! - [`TopologyCache`] shares immutable topology (grid index/UV buffers, tube
//!   buffers, arrow and sphere templates) between expressions with the same
//!   structure, with hit/miss statistics and a memory estimate.
//! - [`GeometryCache`] drives the per-expression rebuild-or-refresh decision.
//!   A rebuild happens when there is no previous geometry, the kind changed
//!   or the bounds signature changed; otherwise only attribute buffers are
//!   rewritten and topology is left untouched.
//!
//! # Example
//! ```ignore
//! let mut cache = GeometryCache::new(GeometryStyle::default());
//! let mut slot = None;
//! let outcome = cache.update(&mut slot, UpdateRequest { kind, bounds, source: &compiled })?;
//! assert_eq!(outcome.kind, UpdateKind::Rebuilt);
//! for handle in cache.take_released() {
//!     renderer.dispose(handle);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arrows::{ArrowField, ArrowStyle, ArrowTemplate, ColorScale, build_arrow_template};
use super::core::{Point3, flip_axes};
use super::diagnostics::BuildDiagnostics;
use super::kind::ExpressionKind;
use super::marker::{PointMarker, SphereTemplate, build_sphere_template};
use super::mesh::GridMesh;
use super::mesh::GridTopology;
use super::params::{Bounds, BoundsSignature};
use super::sampler::{Sweep, sample};
use super::tube::{TubeMesh, TubeStyle, TubeTopology, hold_degenerate_samples};
use super::{BuildError, SampleSource, evaluate_at};

const SPHERE_WIDTH_SEGMENTS: u32 = 32;
const SPHERE_HEIGHT_SEGMENTS: u32 = 16;

/// Opaque identity of one renderable group owned by an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupHandle(pub u64);

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Visual styling that shapes topology; fixed for the lifetime of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryStyle {
    pub tube: TubeStyle,
    pub arrows: ArrowStyle,
    pub point_radius: f64,
    pub color_scale: ColorScale,
}

impl Default for GeometryStyle {
    fn default() -> Self {
        Self {
            tube: TubeStyle::default(),
            arrows: ArrowStyle::default(),
            point_radius: 0.2,
            color_scale: ColorScale::default(),
        }
    }
}

/// Built geometry, one variant per family of plottable kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotGeometry {
    /// Surfaces and parametric surfaces.
    Grid(GridMesh),
    Tube(TubeMesh),
    Arrows(ArrowField),
    Point(PointMarker),
}

impl PlotGeometry {
    /// Vertices owned by this geometry; templates count once.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Grid(mesh) => mesh.vertex_count(),
            Self::Tube(tube) => tube.vertex_count(),
            Self::Arrows(field) => field.template.vertex_count(),
            Self::Point(marker) => marker.template.vertex_count(),
        }
    }

    /// Independently placed primitives: one per arrow, otherwise one.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        match self {
            Self::Arrows(field) => field.instances.len(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedGeometry {
    pub handle: GroupHandle,
    pub kind: ExpressionKind,
    pub signature: BoundsSignature,
    pub geometry: PlotGeometry,
    /// Bumped on every in-place refresh.
    pub revision: u64,
    pub diagnostics: BuildDiagnostics,
}

pub struct UpdateRequest<'a> {
    pub kind: ExpressionKind,
    pub bounds: Bounds,
    pub source: &'a dyn SampleSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Topology was (re)built under a new handle.
    Rebuilt,
    /// Attributes were rewritten in place; handle and topology unchanged.
    Refreshed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub kind: UpdateKind,
    pub handle: GroupHandle,
    pub diagnostics: BuildDiagnostics,
}

/// Topology cache statistics for diagnostics and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyCacheStats {
    pub grid_entries: usize,
    pub tube_entries: usize,
    pub template_entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub estimated_memory_bytes: usize,
}

impl TopologyCacheStats {
    #[must_use]
    pub const fn total_entries(&self) -> usize {
        self.grid_entries + self.tube_entries + self.template_entries
    }

    /// Returns 0.0 if no cache accesses have been made.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared immutable topology keyed by structure.
#[derive(Debug, Default)]
pub struct TopologyCache {
    grids: HashMap<u32, GridTopology>,
    tubes: HashMap<(usize, usize), TubeTopology>,
    arrow_template: Option<Arc<ArrowTemplate>>,
    sphere_template: Option<Arc<SphereTemplate>>,
    hits: usize,
    misses: usize,
}

impl TopologyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn grid(&mut self, resolution: u32) -> GridTopology {
        if let Some(cached) = self.grids.get(&resolution) {
            self.hits += 1;
            return cached.clone();
        }
        self.misses += 1;
        let topology = GridTopology::new(resolution);
        self.grids.insert(resolution, topology.clone());
        topology
    }

    #[must_use]
    pub fn tube(&mut self, tubular_segments: usize, radial_segments: usize) -> TubeTopology {
        let key = (tubular_segments, radial_segments);
        if let Some(cached) = self.tubes.get(&key) {
            self.hits += 1;
            return cached.clone();
        }
        self.misses += 1;
        let topology = TubeTopology::new(tubular_segments, radial_segments);
        self.tubes.insert(key, topology.clone());
        topology
    }

    #[must_use]
    pub fn arrow_template(&mut self, style: &ArrowStyle) -> Arc<ArrowTemplate> {
        if let Some(template) = &self.arrow_template {
            self.hits += 1;
            return Arc::clone(template);
        }
        self.misses += 1;
        let template = Arc::new(build_arrow_template(style));
        self.arrow_template = Some(Arc::clone(&template));
        template
    }

    #[must_use]
    pub fn sphere_template(&mut self, radius: f64) -> Arc<SphereTemplate> {
        if let Some(template) = &self.sphere_template {
            self.hits += 1;
            return Arc::clone(template);
        }
        self.misses += 1;
        let template = Arc::new(build_sphere_template(
            radius,
            SPHERE_WIDTH_SEGMENTS,
            SPHERE_HEIGHT_SEGMENTS,
        ));
        self.sphere_template = Some(Arc::clone(&template));
        template
    }

    /// Drop grid and tube topology no live geometry refers to.
    pub fn prune_unused(&mut self) -> usize {
        let before = self.grids.len() + self.tubes.len();
        self.grids.retain(|_, topology| Arc::strong_count(&topology.indices) > 1);
        self.tubes.retain(|_, topology| Arc::strong_count(&topology.indices) > 1);
        before - (self.grids.len() + self.tubes.len())
    }

    /// Clears all cached data and resets hit/miss counters.
    pub fn clear(&mut self) {
        self.grids.clear();
        self.tubes.clear();
        self.arrow_template = None;
        self.sphere_template = None;
        self.hits = 0;
        self.misses = 0;
    }

    #[must_use]
    pub fn estimate_memory_usage(&self) -> usize {
        let mut total = 0usize;
        total += self.grids.values().map(GridTopology::estimated_bytes).sum::<usize>();
        total += self.tubes.values().map(TubeTopology::estimated_bytes).sum::<usize>();
        total += self.arrow_template.as_ref().map_or(0, |t| t.estimated_bytes());
        total += self.sphere_template.as_ref().map_or(0, |t| t.estimated_bytes());
        total
    }

    #[must_use]
    pub fn stats(&self) -> TopologyCacheStats {
        TopologyCacheStats {
            grid_entries: self.grids.len(),
            tube_entries: self.tubes.len(),
            template_entries: usize::from(self.arrow_template.is_some())
                + usize::from(self.sphere_template.is_some()),
            hits: self.hits,
            misses: self.misses,
            estimated_memory_bytes: self.estimate_memory_usage(),
        }
    }
}

/// Owner of the rebuild-or-refresh decision and of renderable handles.
#[derive(Debug)]
pub struct GeometryCache {
    style: GeometryStyle,
    topology: TopologyCache,
    next_handle: u64,
    released: Vec<GroupHandle>,
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::new(GeometryStyle::default())
    }
}

impl GeometryCache {
    #[must_use]
    pub fn new(style: GeometryStyle) -> Self {
        Self {
            style,
            topology: TopologyCache::new(),
            next_handle: 1,
            released: Vec::new(),
        }
    }

    #[must_use]
    pub fn style(&self) -> &GeometryStyle {
        &self.style
    }

    #[must_use]
    pub fn topology(&self) -> &TopologyCache {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut TopologyCache {
        &mut self.topology
    }

    /// Build or refresh the geometry in `slot`.
    ///
    /// On error the slot is left empty and any previous handle is released.
    pub fn update(
        &mut self,
        slot: &mut Option<CachedGeometry>,
        request: UpdateRequest<'_>,
    ) -> Result<UpdateOutcome, BuildError> {
        let UpdateRequest {
            kind,
            bounds,
            source,
        } = request;

        if let Err(err) = check_request(kind, &bounds, source) {
            self.release(slot);
            return Err(err);
        }
        let sweep = match sample(&bounds) {
            Ok(sweep) => sweep,
            Err(err) => {
                self.release(slot);
                return Err(err.into());
            }
        };
        let signature = bounds.signature();

        let refreshed = match slot
            .as_mut()
            .filter(|cached| cached.kind == kind && cached.signature == signature)
        {
            Some(cached) => {
                let mut diagnostics = BuildDiagnostics::new();
                let result = fill(&mut cached.geometry, &sweep, source, &mut diagnostics);
                result.map(|()| {
                    cached.revision += 1;
                    cached.diagnostics = diagnostics.clone();
                    UpdateOutcome {
                        kind: UpdateKind::Refreshed,
                        handle: cached.handle,
                        diagnostics,
                    }
                })
            }
            None => {
                self.release(slot);
                self.rebuild(slot, kind, &bounds, signature, &sweep, source)
            }
        };

        match refreshed {
            Ok(outcome) => {
                log::debug!(
                    "{} {kind} {}: {}",
                    match outcome.kind {
                        UpdateKind::Rebuilt => "rebuilt",
                        UpdateKind::Refreshed => "refreshed",
                    },
                    outcome.handle,
                    outcome.diagnostics
                );
                Ok(outcome)
            }
            Err(err) => {
                self.release(slot);
                Err(err)
            }
        }
    }

    fn rebuild(
        &mut self,
        slot: &mut Option<CachedGeometry>,
        kind: ExpressionKind,
        bounds: &Bounds,
        signature: BoundsSignature,
        sweep: &Sweep,
        source: &dyn SampleSource,
    ) -> Result<UpdateOutcome, BuildError> {
        let mut geometry = self.allocate(kind, bounds, sweep)?;
        let mut diagnostics = BuildDiagnostics::new();
        fill(&mut geometry, sweep, source, &mut diagnostics)?;

        let handle = GroupHandle(self.next_handle);
        self.next_handle += 1;
        *slot = Some(CachedGeometry {
            handle,
            kind,
            signature,
            geometry,
            revision: 0,
            diagnostics: diagnostics.clone(),
        });
        Ok(UpdateOutcome {
            kind: UpdateKind::Rebuilt,
            handle,
            diagnostics,
        })
    }

    fn allocate(
        &mut self,
        kind: ExpressionKind,
        bounds: &Bounds,
        sweep: &Sweep,
    ) -> Result<PlotGeometry, BuildError> {
        let geometry = match (kind, bounds) {
            (ExpressionKind::Surface, Bounds::Surface { resolution, .. })
            | (ExpressionKind::ParametricSurface, Bounds::ParametricSurface { resolution, .. }) => {
                PlotGeometry::Grid(GridMesh::new(self.topology.grid(*resolution)))
            }
            (ExpressionKind::ParametricLine, Bounds::ParametricLine { .. }) => {
                let style = self.style.tube;
                let topology = self.topology.tube(
                    style.tubular_segments(sweep.len()),
                    style.radial_segments.max(3) as usize,
                );
                PlotGeometry::Tube(TubeMesh::new(topology, style.radius))
            }
            (ExpressionKind::VectorField, Bounds::VectorField { .. }) => {
                let template = self.topology.arrow_template(&self.style.arrows);
                PlotGeometry::Arrows(ArrowField::new(template, sweep, self.style.color_scale))
            }
            (ExpressionKind::Point, Bounds::Point) => {
                let template = self.topology.sphere_template(self.style.point_radius);
                PlotGeometry::Point(PointMarker::new(template))
            }
            _ => return Err(BuildError::BoundsMismatch { kind }),
        };
        Ok(geometry)
    }

    /// Release the geometry in `slot`, queueing its handle for disposal.
    pub fn release(&mut self, slot: &mut Option<CachedGeometry>) {
        if let Some(old) = slot.take() {
            log::debug!("released {} ({})", old.handle, old.kind);
            self.released.push(old.handle);
        }
    }

    /// Handles released since the last call; the renderer disposes these.
    pub fn take_released(&mut self) -> Vec<GroupHandle> {
        std::mem::take(&mut self.released)
    }
}

fn check_request(
    kind: ExpressionKind,
    bounds: &Bounds,
    source: &dyn SampleSource,
) -> Result<(), BuildError> {
    if !kind.is_plottable() {
        return Err(BuildError::NotPlottable { kind });
    }
    let expected = kind.expected_arity().unwrap_or(0);
    if source.arity() != expected {
        return Err(BuildError::WrongArity {
            kind,
            expected,
            got: source.arity(),
        });
    }
    let matches_kind = matches!(
        (kind, bounds),
        (ExpressionKind::Surface, Bounds::Surface { .. })
            | (ExpressionKind::ParametricSurface, Bounds::ParametricSurface { .. })
            | (ExpressionKind::ParametricLine, Bounds::ParametricLine { .. })
            | (ExpressionKind::VectorField, Bounds::VectorField { .. })
            | (ExpressionKind::Point, Bounds::Point)
    );
    if matches_kind {
        Ok(())
    } else {
        Err(BuildError::BoundsMismatch { kind })
    }
}

/// Rewrite attribute buffers of `geometry` from a fresh evaluation.
fn fill(
    geometry: &mut PlotGeometry,
    sweep: &Sweep,
    source: &dyn SampleSource,
    diagnostics: &mut BuildDiagnostics,
) -> Result<(), BuildError> {
    match geometry {
        PlotGeometry::Grid(mesh) => {
            let kind = match sweep.variables() {
                ["u", "v"] => ExpressionKind::ParametricSurface,
                _ => ExpressionKind::Surface,
            };
            mesh.fill(kind, sweep, source, diagnostics);
            Ok(())
        }
        PlotGeometry::Tube(tube) => fill_tube(tube, sweep, source, diagnostics),
        PlotGeometry::Arrows(field) => {
            field.fill(sweep, source, diagnostics);
            Ok(())
        }
        PlotGeometry::Point(marker) => marker.fill(sweep, source, diagnostics),
    }
}

fn fill_tube(
    tube: &mut TubeMesh,
    sweep: &Sweep,
    source: &dyn SampleSource,
    diagnostics: &mut BuildDiagnostics,
) -> Result<(), BuildError> {
    let mut out = [0.0; 3];
    let samples: Vec<Option<Point3>> = sweep
        .iter()
        .map(|point| match evaluate_at(source, sweep, &point, &mut out) {
            Ok(()) => Some(Point3::from_array(flip_axes(out))),
            Err(err) => {
                diagnostics.record_degenerate(err);
                None
            }
        })
        .collect();
    let control = hold_degenerate_samples(&samples)?;
    if diagnostics.degenerate_samples > 0 {
        diagnostics.add_warning(format!(
            "{} undefined line samples held at the previous point",
            diagnostics.degenerate_samples
        ));
    }
    tube.fill(&control);

    diagnostics.sample_count = sweep.len();
    diagnostics.vertex_count = tube.vertex_count();
    diagnostics.triangle_count = tube.triangle_count();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::plot::params::Range;
    use crate::plot::{FnSource, SampleError, binding};

    fn surface_bounds(resolution: u32) -> Bounds {
        Bounds::Surface {
            x: Range::new(-1.0, 1.0),
            y: Range::new(-1.0, 1.0),
            resolution,
        }
    }

    fn surface_request(source: &dyn SampleSource, resolution: u32) -> UpdateRequest<'_> {
        UpdateRequest {
            kind: ExpressionKind::Surface,
            bounds: surface_bounds(resolution),
            source,
        }
    }

    fn point_request(source: &dyn SampleSource) -> UpdateRequest<'_> {
        UpdateRequest {
            kind: ExpressionKind::Point,
            bounds: Bounds::Point,
            source,
        }
    }

    fn grid(slot: &Option<CachedGeometry>) -> &GridMesh {
        match &slot.as_ref().unwrap().geometry {
            PlotGeometry::Grid(mesh) => mesh,
            other => panic!("expected grid, got {other:?}"),
        }
    }

    #[test]
    fn first_update_rebuilds() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let source = FnSource::new(1, |b: &[(&str, f64)]| Ok([binding(b, "x") + binding(b, "y"), 0.0, 0.0]));
        let outcome = cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(2),
                    source: &source,
                },
            )
            .unwrap();
        assert_eq!(outcome.kind, UpdateKind::Rebuilt);
        assert_eq!(grid(&slot).vertex_count(), 9);
        assert_eq!(grid(&slot).positions[4], [0.0, 0.0, 0.0]);
        assert!(cache.take_released().is_empty());
    }

    #[test]
    fn value_change_refreshes_in_place() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let a = Cell::new(1.0);
        let source = FnSource::new(1, |b: &[(&str, f64)]| Ok([a.get() * binding(b, "x"), 0.0, 0.0]));
        cache.update(&mut slot, surface_request(&source, 4)).unwrap();
        let handle = slot.as_ref().unwrap().handle;
        let indices = Arc::clone(&grid(&slot).topology.indices);
        let before = grid(&slot).positions.clone();

        a.set(2.0);
        let outcome = cache.update(&mut slot, surface_request(&source, 4)).unwrap();
        assert_eq!(outcome.kind, UpdateKind::Refreshed);
        assert_eq!(outcome.handle, handle);
        assert!(Arc::ptr_eq(&indices, &grid(&slot).topology.indices));
        assert_eq!(grid(&slot).vertex_count(), before.len());
        assert_ne!(grid(&slot).positions, before);
        assert_eq!(slot.as_ref().unwrap().revision, 1);
        assert!(cache.take_released().is_empty());
    }

    #[test]
    fn identical_update_is_bit_identical() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let source = FnSource::new(1, |b: &[(&str, f64)]| {
            Ok([(binding(b, "x") * 3.0).sin() * binding(b, "y").cos(), 0.0, 0.0])
        });
        cache.update(&mut slot, surface_request(&source, 6)).unwrap();
        let first: Vec<u64> = grid(&slot).positions.iter().flatten().map(|v| v.to_bits()).collect();
        cache.update(&mut slot, surface_request(&source, 6)).unwrap();
        let second: Vec<u64> = grid(&slot).positions.iter().flatten().map(|v| v.to_bits()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn signature_change_releases_and_rebuilds() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let source = FnSource::new(1, |_: &[(&str, f64)]| Ok([1.0, 0.0, 0.0]));
        cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(2),
                    source: &source,
                },
            )
            .unwrap();
        let old = slot.as_ref().unwrap().handle;

        let outcome = cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(3),
                    source: &source,
                },
            )
            .unwrap();
        assert_eq!(outcome.kind, UpdateKind::Rebuilt);
        assert_ne!(outcome.handle, old);
        assert_eq!(cache.take_released(), vec![old]);
        assert_eq!(grid(&slot).vertex_count(), 16);
    }

    #[test]
    fn kind_change_rebuilds() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let scalar = FnSource::new(1, |_: &[(&str, f64)]| Ok([1.0, 0.0, 0.0]));
        let point = FnSource::new(3, |_: &[(&str, f64)]| Ok([1.0, 2.0, 3.0]));
        cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(2),
                    source: &scalar,
                },
            )
            .unwrap();
        let outcome = cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Point,
                    bounds: Bounds::Point,
                    source: &point,
                },
            )
            .unwrap();
        assert_eq!(outcome.kind, UpdateKind::Rebuilt);
        assert_eq!(cache.take_released().len(), 1);
        assert!(matches!(
            slot.as_ref().unwrap().geometry,
            PlotGeometry::Point(ref marker) if marker.center == [1.0, 3.0, 2.0]
        ));
    }

    #[test]
    fn failed_build_leaves_slot_empty() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let good = FnSource::new(3, |_: &[(&str, f64)]| Ok([0.0, 0.0, 0.0]));
        let bad = FnSource::new(3, |_: &[(&str, f64)]| Err(SampleError::Evaluation("boom".into())));
        cache.update(&mut slot, point_request(&good)).unwrap();
        let err = cache.update(&mut slot, point_request(&bad)).unwrap_err();
        assert!(matches!(err, BuildError::NonFinitePoint(_)));
        assert!(slot.is_none());
        assert_eq!(cache.take_released().len(), 1);
    }

    #[test]
    fn line_with_too_few_samples_fails() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let source = FnSource::new(3, |b: &[(&str, f64)]| {
            let t = binding(b, "t");
            Ok([1.0 / t - 1.0 / t, 0.0, t])
        });
        let err = cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::ParametricLine,
                    bounds: Bounds::ParametricLine {
                        t: Range::new(0.0, 0.01),
                        step: 0.01,
                    },
                    source: &source,
                },
            )
            .unwrap_err();
        assert_eq!(err, BuildError::LineTooShort { finite: 1 });
        assert!(slot.is_none());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut cache = GeometryCache::default();
        let mut slot = None;
        let source = FnSource::new(3, |_: &[(&str, f64)]| Ok([0.0; 3]));
        let err = cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(1),
                    source: &source,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::WrongArity { expected: 1, got: 3, .. }));
    }

    #[test]
    fn topology_is_shared_between_expressions() {
        let mut cache = GeometryCache::default();
        let source = FnSource::new(1, |_: &[(&str, f64)]| Ok([0.0; 3]));
        let mut first = None;
        let mut second = None;
        for slot in [&mut first, &mut second] {
            cache
                .update(
                    slot,
                    UpdateRequest {
                        kind: ExpressionKind::Surface,
                        bounds: surface_bounds(5),
                        source: &source,
                    },
                )
                .unwrap();
        }
        assert!(Arc::ptr_eq(
            &grid(&first).topology.indices,
            &grid(&second).topology.indices
        ));
        let stats = cache.topology().stats();
        assert_eq!(stats.grid_entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-12);
        assert!(stats.estimated_memory_bytes >= 5 * 5 * 6 * 4);
    }

    #[test]
    fn prune_drops_unreferenced_topology() {
        let mut cache = GeometryCache::default();
        let source = FnSource::new(1, |_: &[(&str, f64)]| Ok([0.0; 3]));
        let mut slot = None;
        cache
            .update(
                &mut slot,
                UpdateRequest {
                    kind: ExpressionKind::Surface,
                    bounds: surface_bounds(3),
                    source: &source,
                },
            )
            .unwrap();
        assert_eq!(cache.topology_mut().prune_unused(), 0);
        cache.release(&mut slot);
        assert_eq!(cache.topology_mut().prune_unused(), 1);
        assert_eq!(cache.topology().stats().grid_entries, 0);
    }
}

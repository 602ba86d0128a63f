//! Vector field arrows.
//!
//! Every lattice point owns one arrow instance for the lifetime of a bounds
//! signature. Zero or undefined field values hide the arrow instead of
//! dropping it, so instance count and placement stay stable across edits.

use std::f64::consts::TAU;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::core::{Quaternion, Vec3, flip_axes};
use super::diagnostics::BuildDiagnostics;
use super::mesh::MeshTemplate;
use super::sampler::Sweep;
use super::{SampleSource, evaluate_at};

/// Dimensions of the arrow primitive, modelled along +Y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrowStyle {
    pub length: f64,
    pub shaft_radius: f64,
    pub head_length: f64,
    pub head_radius: f64,
    pub radial_segments: u32,
}

impl Default for ArrowStyle {
    fn default() -> Self {
        Self {
            length: 0.75,
            shaft_radius: 0.01,
            head_length: 0.15,
            head_radius: 0.075,
            radial_segments: 8,
        }
    }
}

impl ArrowStyle {
    #[must_use]
    pub fn shaft_length(&self) -> f64 {
        (self.length - self.head_length).max(0.0)
    }
}

/// Shared arrow mesh; instances only carry a transform and a colour.
pub type ArrowTemplate = MeshTemplate;

/// Shaft cylinder centred on the origin, cone head on top of it.
#[must_use]
pub fn build_arrow_template(style: &ArrowStyle) -> ArrowTemplate {
    let segments = style.radial_segments.max(3) as usize;
    let shaft = style.shaft_length();
    let shaft_top = shaft / 2.0;
    let mut template = MeshTemplate::default();

    push_frustum(&mut template, style.shaft_radius, style.shaft_radius, -shaft_top, shaft_top, segments);
    push_disc(&mut template, style.shaft_radius, -shaft_top, false, segments);
    push_disc(&mut template, style.shaft_radius, shaft_top, true, segments);
    push_frustum(
        &mut template,
        style.head_radius,
        0.0,
        shaft_top,
        shaft_top + style.head_length,
        segments,
    );
    push_disc(&mut template, style.head_radius, shaft_top, false, segments);
    template
}

/// Open side wall between two rings at `y_bottom` and `y_top`.
fn push_frustum(
    template: &mut MeshTemplate,
    bottom_radius: f64,
    top_radius: f64,
    y_bottom: f64,
    y_top: f64,
    segments: usize,
) {
    let slope = (bottom_radius - top_radius) / (y_top - y_bottom);
    let base = template.positions.len() as u32;
    for (radius, y) in [(top_radius, y_top), (bottom_radius, y_bottom)] {
        for x in 0..=segments {
            let theta = x as f64 / segments as f64 * TAU;
            let (sin, cos) = theta.sin_cos();
            template.positions.push([radius * sin, y, radius * cos]);
            let normal = Vec3::new(sin, slope, cos).normalized().unwrap_or(Vec3::Y);
            template.normals.push(normal.to_array());
        }
    }
    let ring = segments as u32 + 1;
    for x in 0..segments as u32 {
        let a = base + x;
        let b = base + ring + x;
        let c = base + ring + x + 1;
        let d = base + x + 1;
        template.indices.extend_from_slice(&[a, b, d, b, c, d]);
    }
}

/// Flat cap at height `y`, facing +Y when `up`.
fn push_disc(template: &mut MeshTemplate, radius: f64, y: f64, up: bool, segments: usize) {
    let normal = if up { [0.0, 1.0, 0.0] } else { [0.0, -1.0, 0.0] };
    let center = template.positions.len() as u32;
    template.positions.push([0.0, y, 0.0]);
    template.normals.push(normal);
    for x in 0..=segments {
        let theta = x as f64 / segments as f64 * TAU;
        let (sin, cos) = theta.sin_cos();
        template.positions.push([radius * sin, y, radius * cos]);
        template.normals.push(normal);
    }
    for x in 0..segments as u32 {
        let current = center + 1 + x;
        let next = current + 1;
        if up {
            template.indices.extend_from_slice(&[center, current, next]);
        } else {
            template.indices.extend_from_slice(&[center, next, current]);
        }
    }
}

/// How field magnitudes map onto the colour gradient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ColorScale {
    /// Normalize against the largest finite magnitude of the current pass.
    #[default]
    MaxMagnitude,
    /// Normalize against a fixed `[min, max]` intensity range.
    Fixed { min: f64, max: f64 },
}

impl ColorScale {
    #[must_use]
    pub fn normalize(self, magnitude: f64, max_seen: f64) -> f64 {
        let t = match self {
            Self::MaxMagnitude if max_seen > 0.0 => magnitude / max_seen,
            Self::MaxMagnitude => 0.0,
            Self::Fixed { min, max } if max > min => (magnitude - min) / (max - min),
            Self::Fixed { .. } => 0.0,
        };
        t.clamp(0.0, 1.0)
    }
}

/// Five-stop gradient blue → cyan → green → yellow → red over `t ∈ [0, 1]`.
#[must_use]
pub fn intensity_color(t: f64) -> [f64; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    if t < 0.25 {
        [0.0, t / 0.25, 1.0]
    } else if t < 0.5 {
        [0.0, 1.0, 1.0 - (t - 0.25) / 0.25]
    } else if t < 0.75 {
        [(t - 0.5) / 0.25, 1.0, 0.0]
    } else {
        [1.0, 1.0 - (t - 0.75) / 0.25, 0.0]
    }
}

/// One arrow at a lattice point, in scene space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrowInstance {
    pub origin: [f64; 3],
    /// Unit direction; +Y while hidden.
    pub direction: [f64; 3],
    /// Rotation of the +Y template onto `direction`, `[x, y, z, w]`.
    pub rotation: [f64; 4],
    pub magnitude: f64,
    pub color: [f64; 3],
    pub visible: bool,
}

impl ArrowInstance {
    fn hidden(origin: [f64; 3]) -> Self {
        Self {
            origin,
            direction: [0.0, 1.0, 0.0],
            rotation: Quaternion::IDENTITY.to_array(),
            magnitude: 0.0,
            color: intensity_color(0.0),
            visible: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowField {
    pub template: Arc<ArrowTemplate>,
    pub instances: Vec<ArrowInstance>,
    pub color_scale: ColorScale,
}

impl ArrowField {
    /// One hidden instance per sample of `sweep`.
    #[must_use]
    pub fn new(template: Arc<ArrowTemplate>, sweep: &Sweep, color_scale: ColorScale) -> Self {
        let instances = sweep
            .iter()
            .map(|point| ArrowInstance::hidden(flip_axes(point.values)))
            .collect();
        Self {
            template,
            instances,
            color_scale,
        }
    }

    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.instances.iter().filter(|arrow| arrow.visible).count()
    }

    /// Re-evaluate orientation, magnitude, colour and visibility in place.
    pub fn fill(&mut self, sweep: &Sweep, source: &dyn SampleSource, diagnostics: &mut BuildDiagnostics) {
        debug_assert_eq!(sweep.len(), self.instances.len());
        let mut out = [0.0; 3];
        let mut max_seen = 0.0_f64;

        for (point, arrow) in sweep.iter().zip(self.instances.iter_mut()) {
            let origin = flip_axes(point.values);
            *arrow = ArrowInstance::hidden(origin);

            if let Err(err) = evaluate_at(source, sweep, &point, &mut out) {
                diagnostics.record_degenerate(err);
                continue;
            }
            let field = Vec3::from_array(flip_axes(out));
            let magnitude = field.length();
            let Some(direction) = field.normalized() else {
                continue;
            };
            arrow.direction = direction.to_array();
            arrow.rotation = Quaternion::from_unit_vectors(Vec3::Y, direction).to_array();
            arrow.magnitude = magnitude;
            arrow.visible = true;
            max_seen = max_seen.max(magnitude);
        }

        for arrow in self.instances.iter_mut().filter(|arrow| arrow.visible) {
            arrow.color = intensity_color(self.color_scale.normalize(arrow.magnitude, max_seen));
        }

        diagnostics.sample_count = sweep.len();
        diagnostics.hidden_arrows = self.instances.len() - self.visible_count();
        diagnostics.vertex_count = self.template.vertex_count();
        diagnostics.triangle_count = self.template.triangle_count();
    }
}

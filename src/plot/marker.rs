use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use super::BuildError;
use super::core::flip_axes;
use super::diagnostics::BuildDiagnostics;
use super::mesh::MeshTemplate;
use super::sampler::Sweep;
use super::{SampleSource, evaluate_at};

pub type SphereTemplate = MeshTemplate;

/// UV sphere centred on the origin.
#[must_use]
pub fn build_sphere_template(radius: f64, width_segments: u32, height_segments: u32) -> SphereTemplate {
    let width = width_segments.max(3) as usize;
    let height = height_segments.max(2) as usize;
    let mut template = MeshTemplate::default();

    for iy in 0..=height {
        let v = iy as f64 / height as f64;
        for ix in 0..=width {
            let u = ix as f64 / width as f64;
            let normal = [
                -(u * TAU).cos() * (v * PI).sin(),
                (v * PI).cos(),
                (u * TAU).sin() * (v * PI).sin(),
            ];
            template
                .positions
                .push([normal[0] * radius, normal[1] * radius, normal[2] * radius]);
            template.normals.push(normal);
        }
    }

    let row = width as u32 + 1;
    for iy in 0..height as u32 {
        for ix in 0..width as u32 {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // Pole rows collapse one triangle of each quad.
            if iy != 0 {
                template.indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height as u32 - 1 {
                template.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    template
}

/// Sphere marker for a constant point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMarker {
    pub template: Arc<SphereTemplate>,
    pub center: [f64; 3],
}

impl PointMarker {
    #[must_use]
    pub fn new(template: Arc<SphereTemplate>) -> Self {
        Self {
            template,
            center: [0.0; 3],
        }
    }

    /// Evaluate the point and move the marker; a non-finite point fails.
    pub fn fill(
        &mut self,
        sweep: &Sweep,
        source: &dyn SampleSource,
        diagnostics: &mut BuildDiagnostics,
    ) -> Result<(), BuildError> {
        let mut out = [0.0; 3];
        let point = sweep.point(0).ok_or(BuildError::BoundsMismatch {
            kind: super::ExpressionKind::Point,
        })?;
        if let Err(err) = evaluate_at(source, sweep, &point, &mut out) {
            diagnostics.record_degenerate(&err);
            return Err(BuildError::NonFinitePoint(err));
        }
        self.center = flip_axes(out);
        diagnostics.sample_count = 1;
        diagnostics.vertex_count = self.template.vertex_count();
        diagnostics.triangle_count = self.template.triangle_count();
        Ok(())
    }
}

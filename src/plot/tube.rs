//! Tube meshes for parametric lines.
//!
//! Samples are interpolated with a uniform Catmull-Rom spline, framed with
//! parallel transport and swept with a constant circular cross-section.
//! Topology depends only on `(tubular_segments, radial_segments)`, which in
//! turn depends only on the sample count, so a line whose bounds are unchanged
//! refreshes in place.

use std::f64::consts::TAU;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::BuildError;
use super::core::{Point3, Vec3};

const CATMULL_ROM_TENSION: f64 = 0.5;
const FRAME_EPSILON: f64 = 1e-12;

/// Cross-section of a line tube.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TubeStyle {
    pub radius: f64,
    pub radial_segments: u32,
    /// Interpolated path segments per sample.
    pub segments_per_sample: u32,
}

impl Default for TubeStyle {
    fn default() -> Self {
        Self {
            radius: 0.025,
            radial_segments: 8,
            segments_per_sample: 2,
        }
    }
}

impl TubeStyle {
    #[must_use]
    pub fn tubular_segments(&self, sample_count: usize) -> usize {
        (sample_count * self.segments_per_sample.max(1) as usize).max(1)
    }
}

/// Index and UV buffers of a tube with the given segment counts.
#[derive(Debug, Clone, PartialEq)]
pub struct TubeTopology {
    pub tubular_segments: usize,
    pub radial_segments: usize,
    pub indices: Arc<Vec<u32>>,
    pub uvs: Arc<Vec<[f64; 2]>>,
}

impl TubeTopology {
    #[must_use]
    pub fn new(tubular_segments: usize, radial_segments: usize) -> Self {
        let ring = radial_segments + 1;
        let mut indices = Vec::with_capacity(tubular_segments * radial_segments * 6);
        for j in 1..=tubular_segments {
            for i in 1..=radial_segments {
                let a = (ring * (j - 1) + (i - 1)) as u32;
                let b = (ring * j + (i - 1)) as u32;
                let c = (ring * j + i) as u32;
                let d = (ring * (j - 1) + i) as u32;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        let mut uvs = Vec::with_capacity((tubular_segments + 1) * ring);
        for j in 0..=tubular_segments {
            for i in 0..=radial_segments {
                uvs.push([
                    j as f64 / tubular_segments as f64,
                    i as f64 / radial_segments as f64,
                ]);
            }
        }

        Self {
            tubular_segments,
            radial_segments,
            indices: Arc::new(indices),
            uvs: Arc::new(uvs),
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        (self.tubular_segments + 1) * (self.radial_segments + 1)
    }

    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.indices.len() * 4 + self.uvs.len() * 16
    }
}

/// Tube around a smooth centre path.
#[derive(Debug, Clone, PartialEq)]
pub struct TubeMesh {
    pub topology: TubeTopology,
    /// Interpolated centre line, `tubular_segments + 1` points.
    pub path: Vec<[f64; 3]>,
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub radius: f64,
}

impl TubeMesh {
    #[must_use]
    pub fn new(topology: TubeTopology, radius: f64) -> Self {
        let count = topology.vertex_count();
        Self {
            path: vec![[0.0; 3]; topology.tubular_segments + 1],
            positions: vec![[0.0; 3]; count],
            normals: vec![[0.0, 1.0, 0.0]; count],
            topology,
            radius,
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.topology.indices.len() / 3
    }

    /// Rebuild path and rings from scene-space control points in place.
    pub fn fill(&mut self, control: &[Point3]) {
        let path = smooth_path(control, self.topology.tubular_segments);
        let frames = transport_frames(&path);
        let radial = self.topology.radial_segments;
        let ring = radial + 1;

        for (j, (center, frame)) in path.iter().zip(&frames).enumerate() {
            self.path[j] = center.to_array();
            for i in 0..=radial {
                let angle = i as f64 / radial as f64 * TAU;
                let sin = angle.sin();
                let cos = -angle.cos();
                let normal = (frame.normal * cos + frame.binormal * sin)
                    .normalized()
                    .unwrap_or(Vec3::Y);
                let index = j * ring + i;
                self.normals[index] = normal.to_array();
                self.positions[index] = (*center + normal * self.radius).to_array();
            }
        }
    }
}

/// Replace non-finite samples so the tube stays continuous.
///
/// Each gap holds the last finite sample; leading gaps take the first finite
/// one. Fails when fewer than two finite samples exist.
pub fn hold_degenerate_samples(samples: &[Option<Point3>]) -> Result<Vec<Point3>, BuildError> {
    let finite = samples.iter().flatten().count();
    if finite < 2 {
        return Err(BuildError::LineTooShort { finite });
    }
    let mut last = samples.iter().flatten().next().copied().unwrap_or_default();
    Ok(samples
        .iter()
        .map(|sample| {
            if let Some(point) = sample {
                last = *point;
            }
            last
        })
        .collect())
}

/// `segments + 1` points on a uniform Catmull-Rom spline through `control`.
///
/// End tangents come from reflecting the neighbouring control point.
#[must_use]
pub fn smooth_path(control: &[Point3], segments: usize) -> Vec<Point3> {
    match control.len() {
        0 => return vec![Point3::ORIGIN; segments + 1],
        1 => return vec![control[0]; segments + 1],
        _ => {}
    }

    let last = control.len() - 1;
    let at = |index: isize| -> Point3 {
        if index < 0 {
            // p0 - (p1 - p0)
            control[0] + (control[0] - control[1])
        } else if index as usize > last {
            control[last] + (control[last] - control[last - 1])
        } else {
            control[index as usize]
        }
    };

    (0..=segments)
        .map(|k| {
            let p = k as f64 / segments as f64 * last as f64;
            let mut segment = p.floor() as isize;
            let mut t = p - segment as f64;
            if segment as usize >= last {
                segment = last as isize - 1;
                t = 1.0;
            }
            catmull_rom_point(
                at(segment - 1),
                at(segment),
                at(segment + 1),
                at(segment + 2),
                t,
                CATMULL_ROM_TENSION,
            )
        })
        .collect()
}

fn catmull_rom_point(p0: Point3, p1: Point3, p2: Point3, p3: Point3, t: f64, tension: f64) -> Point3 {
    let t2 = t * t;
    let t3 = t2 * t;

    let b0 = -tension * t3 + 2.0 * tension * t2 - tension * t;
    let b1 = (2.0 - tension) * t3 + (tension - 3.0) * t2 + 1.0;
    let b2 = (tension - 2.0) * t3 + (3.0 - 2.0 * tension) * t2 + tension * t;
    let b3 = tension * t3 - tension * t2;

    Point3::new(
        b0 * p0.x + b1 * p1.x + b2 * p2.x + b3 * p3.x,
        b0 * p0.y + b1 * p1.y + b2 * p2.y + b3 * p3.y,
        b0 * p0.z + b1 * p1.z + b2 * p2.z + b3 * p3.z,
    )
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    tangent: Vec3,
    normal: Vec3,
    binormal: Vec3,
}

impl Frame {
    fn from_tangent(tangent: Vec3) -> Self {
        let normal = tangent.any_perpendicular();
        let binormal = tangent.cross(normal).normalized().unwrap_or(Vec3::Z);
        Self {
            tangent,
            normal,
            binormal,
        }
    }
}

fn transport_frames(path: &[Point3]) -> Vec<Frame> {
    let tangents = path_tangents(path);
    let mut frames: Vec<Frame> = Vec::with_capacity(path.len());
    for tangent in tangents {
        let frame = match frames.last() {
            None => Frame::from_tangent(tangent),
            Some(prev) => parallel_transport_frame(prev, tangent),
        };
        frames.push(frame);
    }
    frames
}

/// Central-difference tangents; degenerate segments reuse the previous one.
fn path_tangents(path: &[Point3]) -> Vec<Vec3> {
    let n = path.len();
    let mut tangents = Vec::with_capacity(n);
    let mut previous = Vec3::X;
    for i in 0..n {
        let prev = path[i.saturating_sub(1)];
        let next = path[(i + 1).min(n.saturating_sub(1))];
        let tangent = (next - prev).normalized().unwrap_or(previous);
        tangents.push(tangent);
        previous = tangent;
    }
    tangents
}

fn parallel_transport_frame(prev: &Frame, tangent: Vec3) -> Frame {
    let axis = prev.tangent.cross(tangent);
    if axis.length_squared() < FRAME_EPSILON {
        let flip = if prev.tangent.dot(tangent) < 0.0 { -1.0 } else { 1.0 };
        return Frame {
            tangent,
            normal: prev.normal * flip,
            binormal: prev.binormal * flip,
        };
    }

    let axis = axis.normalized().unwrap_or(Vec3::Z);
    let angle = prev.tangent.dot(tangent).clamp(-1.0, 1.0).acos();
    let normal = rotate_vector(prev.normal, axis, angle)
        .normalized()
        .unwrap_or(prev.normal);
    let binormal = tangent.cross(normal).normalized().unwrap_or(prev.binormal);
    Frame {
        tangent,
        normal,
        binormal,
    }
}

fn rotate_vector(v: Vec3, axis: Vec3, angle: f64) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    v * cos + axis.cross(v) * sin + axis * (axis.dot(v) * (1.0 - cos))
}

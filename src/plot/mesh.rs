use std::sync::Arc;

use serde::Serialize;

use super::diagnostics::BuildDiagnostics;
use super::kind::ExpressionKind;
use super::sampler::{Sweep, grid_index};
use super::{SampleSource, core::flip_axes, evaluate_at};

/// Normal used for vertices without a usable adjacent triangle.
const FALLBACK_NORMAL: [f64; 3] = [0.0, 1.0, 0.0];

/// Immutable triangle mesh shared between instances (arrow and sphere templates).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeshTemplate {
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
}

impl MeshTemplate {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append `other` with its indices offset past the current vertices.
    pub fn append(&mut self, other: &Self) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }

    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.positions.len() * 24 + self.normals.len() * 24 + self.indices.len() * 4
    }
}

/// Index and UV buffers of a `(resolution + 1)²` grid.
///
/// Both buffers depend only on the resolution and are shared through the
/// topology cache; a refresh never touches them.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTopology {
    pub resolution: u32,
    pub indices: Arc<Vec<u32>>,
    pub uvs: Arc<Vec<[f64; 2]>>,
}

impl GridTopology {
    #[must_use]
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            indices: Arc::new(grid_indices(resolution)),
            uvs: Arc::new(grid_uvs(resolution)),
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        let side = self.resolution as usize + 1;
        side * side
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.indices.len() * 4 + self.uvs.len() * 16
    }
}

/// Triangles `(a, b, c)` and `(b, d, c)` per cell, with
/// `a = i·(res+1)+j`, `b = a+res+1`, `c = a+1`, `d = b+1`.
#[must_use]
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let res = resolution as usize;
    let mut indices = Vec::with_capacity(res * res * 6);
    for i in 0..res {
        for j in 0..res {
            let a = grid_index(i, j, res) as u32;
            let b = a + resolution + 1;
            let c = a + 1;
            let d = b + 1;
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }
    indices
}

/// Normalized grid coordinates `(i / res, j / res)` per vertex.
#[must_use]
pub fn grid_uvs(resolution: u32) -> Vec<[f64; 2]> {
    let res = f64::from(resolution);
    let side = resolution as usize + 1;
    let mut uvs = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            uvs.push([i as f64 / res, j as f64 / res]);
        }
    }
    uvs
}

/// Surface or parametric surface mesh: shared topology plus owned attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    pub topology: GridTopology,
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
}

impl GridMesh {
    /// Allocate attribute buffers for `topology`; positions start out NaN.
    #[must_use]
    pub fn new(topology: GridTopology) -> Self {
        let count = topology.vertex_count();
        Self {
            topology,
            positions: vec![[f64::NAN; 3]; count],
            normals: vec![FALLBACK_NORMAL; count],
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.topology.triangle_count()
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.topology.indices
    }

    #[must_use]
    pub fn uvs(&self) -> &[[f64; 2]] {
        &self.topology.uvs
    }

    /// Re-evaluate every vertex in place and recompute normals.
    ///
    /// Surface vertices sit at `(x, f(x, y), y)`; parametric surface vertices
    /// at `flip(f(u, v))`. Failed samples become NaN positions.
    pub fn fill(
        &mut self,
        kind: ExpressionKind,
        sweep: &Sweep,
        source: &dyn SampleSource,
        diagnostics: &mut BuildDiagnostics,
    ) {
        debug_assert_eq!(sweep.len(), self.positions.len());
        let mut out = [0.0; 3];
        for (point, position) in sweep.iter().zip(self.positions.iter_mut()) {
            *position = match evaluate_at(source, sweep, &point, &mut out) {
                Ok(()) if kind == ExpressionKind::Surface => {
                    [point.values[0], out[0], point.values[1]]
                }
                Ok(()) => flip_axes(out),
                Err(err) => {
                    diagnostics.record_degenerate(err);
                    [f64::NAN; 3]
                }
            };
        }
        compute_vertex_normals(&self.positions, &self.topology.indices, &mut self.normals);

        diagnostics.sample_count = sweep.len();
        diagnostics.vertex_count = self.vertex_count();
        diagnostics.triangle_count = self.triangle_count();
    }

    /// Returns true if all indices address an existing vertex.
    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.positions.len() as u32;
        self.topology.indices.iter().all(|&i| i < n)
    }
}

/// Area-weighted vertex normals.
///
/// Triangles touching a non-finite vertex are skipped; vertices left without
/// a contribution get the +Y fallback normal.
pub fn compute_vertex_normals(positions: &[[f64; 3]], indices: &[u32], normals: &mut Vec<[f64; 3]>) {
    normals.clear();
    normals.resize(positions.len(), [0.0; 3]);

    for tri in indices.chunks_exact(3) {
        let i0 = tri[0] as usize;
        let i1 = tri[1] as usize;
        let i2 = tri[2] as usize;

        let (Some(a), Some(b), Some(c)) = (positions.get(i0), positions.get(i1), positions.get(i2))
        else {
            continue;
        };
        if !(is_finite(a) && is_finite(b) && is_finite(c)) {
            continue;
        }

        let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];

        // Cross product length is twice the triangle area.
        let n = [
            ab[1] * ac[2] - ab[2] * ac[1],
            ab[2] * ac[0] - ab[0] * ac[2],
            ab[0] * ac[1] - ab[1] * ac[0],
        ];

        for &index in &[i0, i1, i2] {
            normals[index][0] += n[0];
            normals[index][1] += n[1];
            normals[index][2] += n[2];
        }
    }

    for n in normals.iter_mut() {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len.is_finite() && len > 0.0 {
            let inv = 1.0 / len;
            n[0] *= inv;
            n[1] *= inv;
            n[2] *= inv;
        } else {
            *n = FALLBACK_NORMAL;
        }
    }
}

fn is_finite(p: &[f64; 3]) -> bool {
    p[0].is_finite() && p[1].is_finite() && p[2].is_finite()
}

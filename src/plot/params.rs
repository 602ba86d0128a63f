//! Plot parameters, resolved bounds and bounds signatures.
//!
//! `PlotParameters` holds the user's optional overrides. `resolve` combines
//! them with kind-specific defaults into `Bounds`, validating them before any
//! sampling happens. `Bounds::signature` is the topology identity used by the
//! geometry cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::kind::ExpressionKind;

/// Parameter names accepted by [`PlotParameters::set`].
pub const PARAMETER_NAMES: &[&str] = &[
    "xMin",
    "xMax",
    "yMin",
    "yMax",
    "zMin",
    "zMax",
    "tMin",
    "tMax",
    "uMin",
    "uMax",
    "vMin",
    "vMax",
    "resolution",
];

/// Largest grid resolution whose `(resolution + 1)²` samples stay within
/// [`super::MAX_SWEEP_SAMPLES`].
pub const MAX_RESOLUTION: u32 = 1999;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("parameter `{name}` must be finite, got {value}")]
    NonFinite { name: String, value: f64 },
    #[error("resolution must be an integer in 1..=1999, got {0}")]
    InvalidResolution(f64),
    #[error("{axis} range is inverted: min {min} > max {max}")]
    InvertedRange { axis: &'static str, min: f64, max: f64 },
    #[error("line step must be finite and > 0, got {0}")]
    InvalidStep(f64),
    #[error("sweep would produce {requested} samples (limit {limit})")]
    TooManySamples { requested: usize, limit: usize },
    #[error("{kind} expressions take at most {max} bound arguments, got {got}")]
    TooManyBounds {
        kind: ExpressionKind,
        max: usize,
        got: usize,
    },
}

/// Closed interval on one sweep axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn span(self) -> f64 {
        self.max - self.min
    }

    fn validated(self, axis: &'static str) -> Result<Self, ParameterError> {
        if !self.min.is_finite() {
            return Err(ParameterError::NonFinite {
                name: format!("{axis}Min"),
                value: self.min,
            });
        }
        if !self.max.is_finite() {
            return Err(ParameterError::NonFinite {
                name: format!("{axis}Max"),
                value: self.max,
            });
        }
        if self.min > self.max {
            return Err(ParameterError::InvertedRange {
                axis,
                min: self.min,
                max: self.max,
            });
        }
        Ok(self)
    }
}

/// Defaults that depend on the engine profile rather than on the kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotDefaults {
    /// Grid resolution for surfaces and parametric surfaces.
    pub surface_resolution: u32,
    /// Fixed parameter step for parametric lines.
    pub line_step: f64,
}

impl Default for PlotDefaults {
    fn default() -> Self {
        Self {
            surface_resolution: 100,
            line_step: 0.01,
        }
    }
}

/// Optional user overrides for the bounds of an expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotParameters {
    pub x_min: Option<f64>,
    pub x_max: Option<f64>,
    pub y_min: Option<f64>,
    pub y_max: Option<f64>,
    pub z_min: Option<f64>,
    pub z_max: Option<f64>,
    pub t_min: Option<f64>,
    pub t_max: Option<f64>,
    pub u_min: Option<f64>,
    pub u_max: Option<f64>,
    pub v_min: Option<f64>,
    pub v_max: Option<f64>,
    pub resolution: Option<u32>,
}

impl PlotParameters {
    /// Set a parameter by its camelCase name.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        if !value.is_finite() {
            return Err(ParameterError::NonFinite {
                name: name.to_owned(),
                value,
            });
        }
        if name == "resolution" {
            self.resolution = Some(validate_resolution(value)?);
            return Ok(());
        }
        *self.slot_mut(name)? = Some(value);
        Ok(())
    }

    /// Remove an override so the kind default applies again.
    pub fn clear(&mut self, name: &str) -> Result<(), ParameterError> {
        if name == "resolution" {
            self.resolution = None;
            return Ok(());
        }
        *self.slot_mut(name)? = None;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "xMin" => self.x_min,
            "xMax" => self.x_max,
            "yMin" => self.y_min,
            "yMax" => self.y_max,
            "zMin" => self.z_min,
            "zMax" => self.z_max,
            "tMin" => self.t_min,
            "tMax" => self.t_max,
            "uMin" => self.u_min,
            "uMax" => self.u_max,
            "vMin" => self.v_min,
            "vMax" => self.v_max,
            "resolution" => self.resolution.map(f64::from),
            _ => None,
        }
    }

    /// Overrides from `other` take precedence over the values in `self`.
    #[must_use]
    pub fn overlay(&self, other: &Self) -> Self {
        Self {
            x_min: other.x_min.or(self.x_min),
            x_max: other.x_max.or(self.x_max),
            y_min: other.y_min.or(self.y_min),
            y_max: other.y_max.or(self.y_max),
            z_min: other.z_min.or(self.z_min),
            z_max: other.z_max.or(self.z_max),
            t_min: other.t_min.or(self.t_min),
            t_max: other.t_max.or(self.t_max),
            u_min: other.u_min.or(self.u_min),
            u_max: other.u_max.or(self.u_max),
            v_min: other.v_min.or(self.v_min),
            v_max: other.v_max.or(self.v_max),
            resolution: other.resolution.or(self.resolution),
        }
    }

    /// Build overrides from positional directive arguments, e.g. the
    /// `x0, x1, y0, y1, resolution` of `surface(f, x0, x1, y0, y1, resolution)`.
    pub fn from_positional(kind: ExpressionKind, values: &[f64]) -> Result<Self, ParameterError> {
        let names = positional_names(kind);
        if values.len() > names.len() {
            return Err(ParameterError::TooManyBounds {
                kind,
                max: names.len(),
                got: values.len(),
            });
        }
        let mut params = Self::default();
        for (name, value) in names.iter().zip(values) {
            params.set(name, *value)?;
        }
        Ok(params)
    }

    /// Combine overrides with the defaults of `kind` and validate the result.
    pub fn resolve(
        &self,
        kind: ExpressionKind,
        defaults: &PlotDefaults,
    ) -> Result<Bounds, ParameterError> {
        let resolution = match self.resolution {
            Some(value) => value,
            None => defaults.surface_resolution,
        };
        if resolution == 0 || resolution > MAX_RESOLUTION {
            return Err(ParameterError::InvalidResolution(f64::from(resolution)));
        }

        let bounds = match kind {
            ExpressionKind::Surface => Bounds::Surface {
                x: self.range(self.x_min, self.x_max, -10.0, 10.0, "x")?,
                y: self.range(self.y_min, self.y_max, -10.0, 10.0, "y")?,
                resolution,
            },
            ExpressionKind::ParametricLine => {
                if !defaults.line_step.is_finite() || defaults.line_step <= 0.0 {
                    return Err(ParameterError::InvalidStep(defaults.line_step));
                }
                Bounds::ParametricLine {
                    t: self.range(self.t_min, self.t_max, 0.0, 10.0, "t")?,
                    step: defaults.line_step,
                }
            }
            ExpressionKind::ParametricSurface => Bounds::ParametricSurface {
                u: self.range(self.u_min, self.u_max, -10.0, 10.0, "u")?,
                v: self.range(self.v_min, self.v_max, -10.0, 10.0, "v")?,
                resolution,
            },
            ExpressionKind::VectorField => Bounds::VectorField {
                x: self.range(self.x_min, self.x_max, -5.0, 5.0, "x")?,
                y: self.range(self.y_min, self.y_max, -5.0, 5.0, "y")?,
                z: self.range(self.z_min, self.z_max, -5.0, 5.0, "z")?,
            },
            ExpressionKind::Point
            | ExpressionKind::Variable
            | ExpressionKind::FunctionDef
            | ExpressionKind::Output
            | ExpressionKind::Unclassified => Bounds::Point,
        };
        Ok(bounds)
    }

    fn range(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        default_min: f64,
        default_max: f64,
        axis: &'static str,
    ) -> Result<Range, ParameterError> {
        Range::new(min.unwrap_or(default_min), max.unwrap_or(default_max)).validated(axis)
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut Option<f64>, ParameterError> {
        let slot = match name {
            "xMin" => &mut self.x_min,
            "xMax" => &mut self.x_max,
            "yMin" => &mut self.y_min,
            "yMax" => &mut self.y_max,
            "zMin" => &mut self.z_min,
            "zMax" => &mut self.z_max,
            "tMin" => &mut self.t_min,
            "tMax" => &mut self.t_max,
            "uMin" => &mut self.u_min,
            "uMax" => &mut self.u_max,
            "vMin" => &mut self.v_min,
            "vMax" => &mut self.v_max,
            _ => return Err(ParameterError::UnknownParameter(name.to_owned())),
        };
        Ok(slot)
    }
}

fn validate_resolution(value: f64) -> Result<u32, ParameterError> {
    if value < 1.0 || value.fract() != 0.0 || value > f64::from(MAX_RESOLUTION) {
        return Err(ParameterError::InvalidResolution(value));
    }
    Ok(value as u32)
}

fn positional_names(kind: ExpressionKind) -> &'static [&'static str] {
    match kind {
        ExpressionKind::Surface => &["xMin", "xMax", "yMin", "yMax", "resolution"],
        ExpressionKind::ParametricLine => &["tMin", "tMax"],
        ExpressionKind::ParametricSurface => &["uMin", "uMax", "vMin", "vMax", "resolution"],
        ExpressionKind::VectorField => &["xMin", "xMax", "yMin", "yMax", "zMin", "zMax"],
        ExpressionKind::Point
        | ExpressionKind::Variable
        | ExpressionKind::FunctionDef
        | ExpressionKind::Output
        | ExpressionKind::Unclassified => &[],
    }
}

/// Validated sweep domain of a plottable expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Surface { x: Range, y: Range, resolution: u32 },
    ParametricLine { t: Range, step: f64 },
    ParametricSurface { u: Range, v: Range, resolution: u32 },
    VectorField { x: Range, y: Range, z: Range },
    Point,
}

impl Bounds {
    /// Topology identity: equal signatures guarantee equal sample counts and
    /// equal index buffers.
    #[must_use]
    pub fn signature(&self) -> BoundsSignature {
        let values: Vec<f64> = match *self {
            Self::Surface { x, y, resolution } => {
                vec![x.min, x.max, y.min, y.max, f64::from(resolution)]
            }
            Self::ParametricLine { t, step } => vec![t.min, t.max, step],
            Self::ParametricSurface { u, v, resolution } => {
                vec![u.min, u.max, v.min, v.max, f64::from(resolution)]
            }
            Self::VectorField { x, y, z } => vec![x.min, x.max, y.min, y.max, z.min, z.max],
            Self::Point => Vec::new(),
        };
        BoundsSignature(values.into_iter().map(canonical_bits).collect())
    }
}

fn canonical_bits(value: f64) -> u64 {
    // -0.0 and 0.0 describe the same bound.
    if value == 0.0 { 0.0_f64.to_bits() } else { value.to_bits() }
}

/// Hashable key derived from every bound that affects topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BoundsSignature(Vec<u64>);

impl fmt::Display for BoundsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for bits in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}", f64::from_bits(*bits))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_kind_specific() {
        let params = PlotParameters::default();
        let defaults = PlotDefaults::default();

        assert_eq!(
            params.resolve(ExpressionKind::Surface, &defaults).unwrap(),
            Bounds::Surface {
                x: Range::new(-10.0, 10.0),
                y: Range::new(-10.0, 10.0),
                resolution: 100,
            }
        );
        assert_eq!(
            params.resolve(ExpressionKind::ParametricLine, &defaults).unwrap(),
            Bounds::ParametricLine {
                t: Range::new(0.0, 10.0),
                step: 0.01,
            }
        );
        assert_eq!(
            params.resolve(ExpressionKind::VectorField, &defaults).unwrap(),
            Bounds::VectorField {
                x: Range::new(-5.0, 5.0),
                y: Range::new(-5.0, 5.0),
                z: Range::new(-5.0, 5.0),
            }
        );
    }

    #[test]
    fn inverted_range_is_rejected_before_sampling() {
        let mut params = PlotParameters::default();
        params.set("xMin", 3.0).unwrap();
        params.set("xMax", 1.0).unwrap();
        let err = params
            .resolve(ExpressionKind::Surface, &PlotDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvertedRange { axis: "x", .. }));
    }

    #[test]
    fn resolution_must_be_positive_integer() {
        let mut params = PlotParameters::default();
        assert!(matches!(
            params.set("resolution", 0.0),
            Err(ParameterError::InvalidResolution(_))
        ));
        assert!(params.set("resolution", 2.5).is_err());
        params.set("resolution", 8.0).unwrap();
        assert_eq!(params.resolution, Some(8));
    }

    #[test]
    fn resolution_is_capped_by_the_sample_limit() {
        let side = MAX_RESOLUTION as usize + 1;
        assert!(side * side <= crate::plot::MAX_SWEEP_SAMPLES);

        let mut params = PlotParameters::default();
        params.set("resolution", f64::from(MAX_RESOLUTION)).unwrap();
        assert!(matches!(
            params.set("resolution", f64::from(MAX_RESOLUTION + 1)),
            Err(ParameterError::InvalidResolution(_))
        ));
        assert!(params.set("resolution", 65_535.0).is_err());

        let defaults = PlotDefaults {
            surface_resolution: 65_535,
            ..PlotDefaults::default()
        };
        assert!(matches!(
            PlotParameters::default().resolve(ExpressionKind::Surface, &defaults),
            Err(ParameterError::InvalidResolution(_))
        ));
    }

    #[test]
    fn unknown_and_non_finite_parameters_fail() {
        let mut params = PlotParameters::default();
        assert!(matches!(
            params.set("wMin", 1.0),
            Err(ParameterError::UnknownParameter(_))
        ));
        assert!(matches!(
            params.set("xMin", f64::NAN),
            Err(ParameterError::NonFinite { .. })
        ));
    }

    #[test]
    fn user_overrides_win_over_directive_bounds() {
        let mut user = PlotParameters::default();
        user.set("xMin", -2.0).unwrap();
        let directive =
            PlotParameters::from_positional(ExpressionKind::Surface, &[-1.0, 3.0]).unwrap();
        let merged = directive.overlay(&user);
        assert_eq!(merged.x_min, Some(-2.0));
        assert_eq!(merged.x_max, Some(3.0));
    }

    #[test]
    fn positional_arguments_are_bounded_per_kind() {
        let err = PlotParameters::from_positional(ExpressionKind::ParametricLine, &[0.0, 1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, ParameterError::TooManyBounds { max: 2, .. }));
    }

    #[test]
    fn signature_tracks_topology_bounds_only() {
        let a = Bounds::Surface {
            x: Range::new(-1.0, 1.0),
            y: Range::new(-1.0, 1.0),
            resolution: 4,
        };
        let b = Bounds::Surface {
            x: Range::new(-1.0, 1.0),
            y: Range::new(-1.0, 1.0),
            resolution: 8,
        };
        assert_eq!(a.signature(), a.signature());
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature().to_string(), "-1,1,-1,1,4");
    }

    #[test]
    fn negative_zero_does_not_change_signature() {
        let a = Bounds::ParametricLine {
            t: Range::new(0.0, 1.0),
            step: 0.01,
        };
        let b = Bounds::ParametricLine {
            t: Range::new(-0.0, 1.0),
            step: 0.01,
        };
        assert_eq!(a.signature(), b.signature());
    }
}

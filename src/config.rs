//! Engineconfiguratie: standaardresolutie, lijnstap en geometriestijl.
//!
//! De JS-host geeft een object door via `serde-wasm-bindgen`, de CLI leest
//! een TOML-bestand. Ontbrekende velden vallen terug op de standaardwaarden.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plot::{ColorScale, GeometryStyle, MAX_RESOLUTION, PlotDefaults};

/// Standaard surface-resolutie voor headless gebruik.
pub const HEADLESS_RESOLUTION: u32 = 100;
/// Lagere standaardresolutie voor live hertekenen.
pub const INTERACTIVE_RESOLUTION: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Headless,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub profile: Profile,
    /// Overschrijft de resolutie van het profiel.
    pub surface_resolution: Option<u32>,
    pub line_step: f64,
    #[serde(flatten)]
    pub style: GeometryStyle,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            surface_resolution: None,
            line_step: PlotDefaults::default().line_step,
            style: GeometryStyle::default(),
        }
    }
}

/// Fout bij het inlezen of valideren van een configuratie.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Syntax(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(message) => write!(f, "configuratie kon niet gelezen worden: {message}"),
            Self::Invalid(message) => write!(f, "ongeldige configuratie: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Configuratie voor het interactieve pad (lagere resolutie).
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            profile: Profile::Interactive,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn surface_resolution(&self) -> u32 {
        self.surface_resolution.unwrap_or(match self.profile {
            Profile::Headless => HEADLESS_RESOLUTION,
            Profile::Interactive => INTERACTIVE_RESOLUTION,
        })
    }

    #[must_use]
    pub fn plot_defaults(&self) -> PlotDefaults {
        PlotDefaults {
            surface_resolution: self.surface_resolution(),
            line_step: self.line_step,
        }
    }

    /// Controleert waarden die serde niet kan afvangen.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolution = self.surface_resolution();
        if resolution == 0 || resolution > MAX_RESOLUTION {
            return Err(ConfigError::Invalid(format!(
                "surface_resolution moet tussen 1 en {MAX_RESOLUTION} liggen, kreeg {resolution}"
            )));
        }
        if !self.line_step.is_finite() || self.line_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "line_step moet positief zijn, kreeg {}",
                self.line_step
            )));
        }
        let tube = &self.style.tube;
        if !(tube.radius.is_finite() && tube.radius > 0.0) || tube.radial_segments < 3 {
            return Err(ConfigError::Invalid(
                "tube vraagt een positieve straal en minstens 3 radiale segmenten".into(),
            ));
        }
        if !(self.style.point_radius.is_finite() && self.style.point_radius > 0.0) {
            return Err(ConfigError::Invalid("point_radius moet positief zijn".into()));
        }
        if let ColorScale::Fixed { min, max } = self.style.color_scale {
            if !(min.is_finite() && max.is_finite()) || max <= min {
                return Err(ConfigError::Invalid(format!(
                    "vaste kleurschaal vraagt min < max, kreeg {min}..{max}"
                )));
            }
        }
        Ok(())
    }

    /// Leest een configuratie uit TOML.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|err| ConfigError::Syntax(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

//! Build diagnostics for plotted geometry.
//!
//! Collected while sampling and building. Per-sample evaluation failures never
//! abort a build; they are counted here instead so callers can surface them
//! (for example as a "12 samples undefined" hint next to an expression).

use std::fmt;

/// Counters describing one build or refresh.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildDiagnostics {
    /// Samples in the sweep.
    pub sample_count: usize,

    /// Samples whose evaluation failed or returned a non-finite value.
    pub degenerate_samples: usize,

    /// Vertices in the produced mesh (arrow/sphere templates excluded).
    pub vertex_count: usize,

    /// Triangles in the produced mesh.
    pub triangle_count: usize,

    /// Arrows hidden because their magnitude was zero or non-finite.
    pub hidden_arrows: usize,

    /// First per-sample error message, kept for display.
    pub first_error: Option<String>,

    /// Human-readable notes about fallbacks that were applied.
    pub warnings: Vec<String>,
}

impl BuildDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when every sample evaluated to a finite value.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degenerate_samples == 0 && self.warnings.is_empty()
    }

    /// Record one degenerate sample, keeping the first error message.
    pub fn record_degenerate(&mut self, error: impl fmt::Display) {
        self.degenerate_samples += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error.to_string());
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

impl fmt::Display for BuildDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples ({} degenerate), {} vertices, {} triangles",
            self.sample_count, self.degenerate_samples, self.vertex_count, self.triangle_count
        )?;
        if self.hidden_arrows > 0 {
            write!(f, ", {} hidden arrows", self.hidden_arrows)?;
        }
        Ok(())
    }
}

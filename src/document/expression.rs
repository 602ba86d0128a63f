//! Eén expressie in het document en de fouten die haar evaluatie kan geven.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::numeric::CompilationError;
use crate::parse::ParseError;
use crate::plot::{
    BuildError, CachedGeometry, ExpressionKind, ExpressionShape, ParameterError, PlotParameters,
};

/// Stabiele identiteit van een expressie; wordt nooit hergebruikt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExpressionId(pub u64);

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}

/// Sliderinstellingen van een variabele.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderSettings {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub speed: f64,
}

impl SliderSettings {
    /// Standaardbereik `[-10, 10]`, verbreed zodat `value` erin past.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min: value.min(-10.0),
            max: value.max(10.0),
            speed: 1.0,
        }
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Uitkomst van de laatste evaluatieronde voor een expressie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionStatus {
    /// Nog niet geëvalueerd.
    Pending,
    /// Lege regel of commentaar.
    Empty,
    /// Variabele of functie toegevoegd aan de scope.
    Bound,
    /// Geometrie gebouwd of ververst.
    Plotted,
    /// Waarde berekend voor `output(...)`.
    Evaluated,
    /// Geen geometrie, zonder fout (onduidelijke classificatie).
    Inert,
    /// Uitgeschakeld; bindingen tellen nog mee.
    Disabled,
    Failed,
}

/// Fout die bij de grens van één expressie wordt opgevangen.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    Parse(ParseError),
    Compilation(CompilationError),
    /// Het directief past niet bij de vorm van de expressie.
    ClassificationAmbiguous {
        kind: ExpressionKind,
        arity: usize,
    },
    Parameter(ParameterError),
    Build(BuildError),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "parsefout: {err}"),
            Self::Compilation(err) => write!(f, "compilatiefout: {err}"),
            Self::ClassificationAmbiguous { kind, arity } => write!(
                f,
                "een expressie met {arity} componenten kan niet als {kind} getekend worden"
            ),
            Self::Parameter(err) => write!(f, "ongeldige parameter: {err}"),
            Self::Build(err) => write!(f, "geometrie kon niet gebouwd worden: {err}"),
        }
    }
}

impl std::error::Error for ExpressionError {}

impl From<ParseError> for ExpressionError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<CompilationError> for ExpressionError {
    fn from(err: CompilationError) -> Self {
        Self::Compilation(err)
    }
}

impl From<ParameterError> for ExpressionError {
    fn from(err: ParameterError) -> Self {
        Self::Parameter(err)
    }
}

impl From<BuildError> for ExpressionError {
    fn from(err: BuildError) -> Self {
        Self::Build(err)
    }
}

#[derive(Debug)]
pub struct Expression {
    pub(crate) id: ExpressionId,
    pub(crate) order: usize,
    pub(crate) content: String,
    pub(crate) kind: ExpressionKind,
    pub(crate) parameters: PlotParameters,
    pub(crate) geometry: Option<CachedGeometry>,
    pub(crate) enabled: bool,
    pub(crate) slider: Option<SliderSettings>,
    /// Waarden van een `output(...)`-expressie.
    pub(crate) output: Option<Vec<f64>>,
    pub(crate) status: ExpressionStatus,
    pub(crate) error: Option<ExpressionError>,
    /// Scopenamen die de laatste evaluatie las.
    pub(crate) dependencies: BTreeSet<String>,
    /// Naam die de expressie in de scope bindt.
    pub(crate) defined_name: Option<String>,
    pub(crate) shape: Option<ExpressionShape>,
    /// Inhoud of parameters gewijzigd sinds de laatste ronde.
    pub(crate) dirty: bool,
}

impl Expression {
    pub(crate) fn new(id: ExpressionId, order: usize, content: &str) -> Self {
        Self {
            id,
            order,
            content: content.to_owned(),
            kind: ExpressionKind::Unclassified,
            parameters: PlotParameters::default(),
            geometry: None,
            enabled: true,
            slider: None,
            output: None,
            status: ExpressionStatus::Pending,
            error: None,
            dependencies: BTreeSet::new(),
            defined_name: None,
            shape: None,
            dirty: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> ExpressionId {
        self.id
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    #[must_use]
    pub fn parameters(&self) -> &PlotParameters {
        &self.parameters
    }

    #[must_use]
    pub fn geometry(&self) -> Option<&CachedGeometry> {
        self.geometry.as_ref()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn slider(&self) -> Option<&SliderSettings> {
        self.slider.as_ref()
    }

    #[must_use]
    pub fn output(&self) -> Option<&[f64]> {
        self.output.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> ExpressionStatus {
        self.status
    }

    #[must_use]
    pub fn error(&self) -> Option<&ExpressionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    #[must_use]
    pub fn defined_name(&self) -> Option<&str> {
        self.defined_name.as_deref()
    }
}

//! Classification of expressions into geometric kinds.
//!
//! The classifier only looks at the *shape* of an expression: how it was
//! written (bare, assignment, function definition, explicit directive), how
//! many components it evaluates to and which free variables it references.
//! It never evaluates anything, so the same shape always yields the same kind.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Variables swept over a plotting domain. They can never be bound by user
/// definitions and always resolve to the current sample while sampling.
pub const SWEEP_VARIABLES: &[&str] = &["x", "y", "z", "t", "u", "v"];

#[must_use]
pub fn is_sweep_variable(name: &str) -> bool {
    SWEEP_VARIABLES.contains(&name)
}

/// Geometric category of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    Surface,
    ParametricLine,
    ParametricSurface,
    VectorField,
    Point,
    Variable,
    FunctionDef,
    /// `output(...)`: evaluated and logged, never plotted.
    Output,
    Unclassified,
}

impl ExpressionKind {
    /// Kinds that produce geometry.
    #[must_use]
    pub const fn is_plottable(self) -> bool {
        matches!(
            self,
            Self::Surface
                | Self::ParametricLine
                | Self::ParametricSurface
                | Self::VectorField
                | Self::Point
        )
    }

    /// Number of components a plottable kind evaluates to.
    #[must_use]
    pub const fn expected_arity(self) -> Option<usize> {
        match self {
            Self::Surface | Self::Variable => Some(1),
            Self::ParametricLine | Self::ParametricSurface | Self::VectorField | Self::Point => {
                Some(3)
            }
            Self::FunctionDef | Self::Output | Self::Unclassified => None,
        }
    }

    /// Sweep variables bound while sampling this kind.
    #[must_use]
    pub const fn sweep_variables(self) -> &'static [&'static str] {
        match self {
            Self::Surface => &["x", "y"],
            Self::ParametricLine => &["t"],
            Self::ParametricSurface => &["u", "v"],
            Self::VectorField => &["x", "y", "z"],
            Self::Point
            | Self::Variable
            | Self::FunctionDef
            | Self::Output
            | Self::Unclassified => &[],
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Surface => "surface",
            Self::ParametricLine => "parametric_line",
            Self::ParametricSurface => "parametric_surface",
            Self::VectorField => "vector_field",
            Self::Point => "point",
            Self::Variable => "variable",
            Self::FunctionDef => "function",
            Self::Output => "output",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the expression was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionForm {
    /// A bare expression to auto-classify.
    Bare,
    /// `name = value`.
    Assignment { name: String },
    /// `name(p1, p2, ...) = body`.
    FunctionDef { name: String, params: Vec<String> },
    /// An explicit plotting directive; `None` asks for auto-classification.
    Directive { kind: Option<ExpressionKind> },
}

/// Everything the classifier needs to know about an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionShape {
    pub form: ExpressionForm,
    pub arity: usize,
    pub free_variables: BTreeSet<String>,
}

impl ExpressionShape {
    /// Two shapes share topology-relevant structure when arity and free
    /// variables match. A mismatch means the geometric kind may have changed.
    #[must_use]
    pub fn same_structure(&self, other: &Self) -> bool {
        self.arity == other.arity && self.free_variables == other.free_variables
    }
}

/// Decide the geometric kind of an expression from its shape.
#[must_use]
pub fn classify(shape: &ExpressionShape) -> ExpressionKind {
    match &shape.form {
        ExpressionForm::Bare => classify_value(shape.arity, &shape.free_variables),
        ExpressionForm::Directive { kind: None } => {
            classify_value(shape.arity, &shape.free_variables)
        }
        ExpressionForm::Directive { kind: Some(kind) } => *kind,
        ExpressionForm::Assignment { .. } if shape.arity == 1 => ExpressionKind::Variable,
        ExpressionForm::Assignment { .. } => ExpressionKind::Unclassified,
        ExpressionForm::FunctionDef { params, .. } => {
            if params.is_empty() || !params.iter().all(|p| is_sweep_variable(p)) {
                return ExpressionKind::FunctionDef;
            }
            match classify_value(shape.arity, &shape.free_variables) {
                kind if kind.is_plottable() && kind != ExpressionKind::Point => kind,
                _ => ExpressionKind::FunctionDef,
            }
        }
    }
}

fn classify_value(arity: usize, free: &BTreeSet<String>) -> ExpressionKind {
    let has = |name: &str| free.contains(name);
    match arity {
        1 => ExpressionKind::Surface,
        3 if has("x") || has("y") || has("z") => ExpressionKind::VectorField,
        3 if has("t") => ExpressionKind::ParametricLine,
        3 if has("u") || has("v") => ExpressionKind::ParametricSurface,
        3 => ExpressionKind::Point,
        _ => ExpressionKind::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(form: ExpressionForm, arity: usize, free: &[&str]) -> ExpressionShape {
        ExpressionShape {
            form,
            arity,
            free_variables: free.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    #[test]
    fn scalar_expressions_are_surfaces() {
        assert_eq!(
            classify(&shape(ExpressionForm::Bare, 1, &["x", "y"])),
            ExpressionKind::Surface
        );
        assert_eq!(
            classify(&shape(ExpressionForm::Bare, 1, &[])),
            ExpressionKind::Surface
        );
    }

    #[test]
    fn triples_follow_priority_order() {
        let bare = |free: &[&str]| classify(&shape(ExpressionForm::Bare, 3, free));
        assert_eq!(bare(&["x", "t"]), ExpressionKind::VectorField);
        assert_eq!(bare(&["z"]), ExpressionKind::VectorField);
        assert_eq!(bare(&["t", "u"]), ExpressionKind::ParametricLine);
        assert_eq!(bare(&["v"]), ExpressionKind::ParametricSurface);
        assert_eq!(bare(&[]), ExpressionKind::Point);
    }

    #[test]
    fn other_arities_are_unclassified() {
        assert_eq!(
            classify(&shape(ExpressionForm::Bare, 2, &["t"])),
            ExpressionKind::Unclassified
        );
        assert_eq!(
            classify(&shape(ExpressionForm::Bare, 4, &[])),
            ExpressionKind::Unclassified
        );
    }

    #[test]
    fn assignments_bind_scalars_only() {
        let assignment = ExpressionForm::Assignment { name: "a".into() };
        assert_eq!(
            classify(&shape(assignment.clone(), 1, &[])),
            ExpressionKind::Variable
        );
        assert_eq!(
            classify(&shape(assignment, 3, &[])),
            ExpressionKind::Unclassified
        );
    }

    #[test]
    fn function_over_sweep_parameters_is_plotted() {
        let form = ExpressionForm::FunctionDef {
            name: "f".into(),
            params: vec!["x".into(), "y".into()],
        };
        assert_eq!(
            classify(&shape(form, 1, &["x", "y"])),
            ExpressionKind::Surface
        );
    }

    #[test]
    fn function_over_other_parameters_is_a_definition() {
        let form = ExpressionForm::FunctionDef {
            name: "g".into(),
            params: vec!["a".into()],
        };
        assert_eq!(classify(&shape(form, 1, &["a"])), ExpressionKind::FunctionDef);
    }

    #[test]
    fn directives_name_the_kind() {
        let form = ExpressionForm::Directive {
            kind: Some(ExpressionKind::ParametricSurface),
        };
        assert_eq!(
            classify(&shape(form, 3, &["u"])),
            ExpressionKind::ParametricSurface
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let shape = shape(ExpressionForm::Bare, 3, &["t"]);
        let first = classify(&shape);
        for _ in 0..16 {
            assert_eq!(classify(&shape.clone()), first);
        }
    }
}

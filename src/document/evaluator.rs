//! Evaluatieronde over alle expressies in volgorde.
//!
//! Elke expressie krijgt de scope die de voorgaande expressies hebben
//! opgebouwd en geeft een (eventueel uitgebreide) scope door. Fouten worden
//! op de grens van de expressie opgevangen: haar geometrie wordt vrijgegeven
//! en de volgende expressie krijgt de scope van vóór de fout.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::numeric::{CompiledExpression, Scope};
use crate::parse::{Statement, parse_statement};
use crate::plot::{
    ExpressionForm, ExpressionKind, ExpressionShape, GeometryCache, PlotDefaults, PlotParameters,
    UpdateKind, UpdateRequest, classify,
};

use super::expression::{Expression, ExpressionError, ExpressionId, ExpressionStatus, SliderSettings};

/// Verschil waaronder een geëvalueerde variabele de slider niet bijwerkt.
const SLIDER_TOLERANCE: f64 = 0.005;

/// Resultaat van één expressie in een ronde.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub id: ExpressionId,
    pub order: usize,
    pub kind: ExpressionKind,
    pub status: ExpressionStatus,
    /// `None` wanneer de geometrie niet werd aangeraakt.
    pub update: Option<UpdateKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub entries: Vec<ReportEntry>,
}

impl EvaluationReport {
    #[must_use]
    pub fn entry(&self, id: ExpressionId) -> Option<&ReportEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    #[must_use]
    pub fn count_updates(&self, kind: UpdateKind) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.update == Some(kind))
            .count()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == ExpressionStatus::Failed)
            .count()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expressies, {} herbouwd, {} ververst, {} mislukt",
            self.entries.len(),
            self.count_updates(UpdateKind::Rebuilt),
            self.count_updates(UpdateKind::Refreshed),
            self.failures()
        )
    }
}

/// Toestand van een lopende ronde.
pub(crate) struct Pass<'a> {
    pub(crate) cache: &'a mut GeometryCache,
    pub(crate) defaults: PlotDefaults,
    /// `None` bij een volledige ronde; anders de gewijzigde namen, die
    /// tijdens de ronde transitief worden uitgebreid.
    pub(crate) affected: Option<BTreeSet<String>>,
}

impl Pass<'_> {
    fn needs_geometry(&self, expr: &Expression) -> bool {
        match &self.affected {
            None => true,
            Some(names) => {
                expr.dirty
                    || expr.geometry.is_none()
                    || expr.dependencies.iter().any(|name| names.contains(name))
            }
        }
    }

    fn propagate(&mut self, expr: &Expression) {
        let Some(names) = self.affected.as_mut() else {
            return;
        };
        let Some(defined) = expr.defined_name.as_deref() else {
            return;
        };
        if expr.dirty || expr.dependencies.iter().any(|name| names.contains(name)) {
            names.insert(defined.to_owned());
        }
    }
}

struct Step {
    scope: Option<Scope>,
    status: ExpressionStatus,
    update: Option<UpdateKind>,
}

impl Step {
    fn status(status: ExpressionStatus) -> Self {
        Self {
            scope: None,
            status,
            update: None,
        }
    }
}

/// Evalueert `expressions` (gesorteerd op volgorde) met `scope` als begin.
pub(crate) fn run(expressions: &mut [Expression], mut scope: Scope, pass: &mut Pass<'_>) -> EvaluationReport {
    let mut report = EvaluationReport::default();

    for expr in expressions.iter_mut() {
        let (update, next) = match evaluate_expression(expr, &scope, pass) {
            Ok(step) => {
                expr.status = step.status;
                expr.error = None;
                (step.update, step.scope)
            }
            Err(err) => {
                pass.cache.release(&mut expr.geometry);
                expr.status = match err {
                    ExpressionError::ClassificationAmbiguous { .. } => ExpressionStatus::Inert,
                    _ => {
                        log::warn!("{} ({}) mislukt: {err}", expr.id, expr.content);
                        ExpressionStatus::Failed
                    }
                };
                expr.error = Some(err);
                (None, None)
            }
        };

        pass.propagate(expr);
        expr.dirty = false;
        if let Some(next) = next {
            scope = next;
        }

        report.entries.push(ReportEntry {
            id: expr.id,
            order: expr.order,
            kind: expr.kind,
            status: expr.status,
            update,
            error: expr.error.as_ref().map(ToString::to_string),
        });
    }

    log::debug!("evaluatieronde: {report}");
    report
}

fn evaluate_expression(
    expr: &mut Expression,
    scope: &Scope,
    pass: &mut Pass<'_>,
) -> Result<Step, ExpressionError> {
    expr.output = None;
    let Some(statement) = parse_statement(&expr.content)? else {
        expr.kind = ExpressionKind::Unclassified;
        expr.shape = None;
        expr.defined_name = None;
        expr.dependencies.clear();
        expr.slider = None;
        pass.cache.release(&mut expr.geometry);
        return Ok(Step::status(ExpressionStatus::Empty));
    };

    expr.defined_name = statement.defined_name().map(str::to_owned);
    let compiled = CompiledExpression::compile(&statement.components, statement.params(), scope)?;
    expr.dependencies = compiled.dependencies().clone();

    let shape = ExpressionShape {
        form: statement.form.clone(),
        arity: compiled.arity(),
        free_variables: compiled.free_variables().clone(),
    };
    let kind = classify(&shape);
    if expr
        .shape
        .as_ref()
        .is_some_and(|previous| !previous.same_structure(&shape))
    {
        pass.cache.release(&mut expr.geometry);
    }
    expr.shape = Some(shape);
    expr.kind = kind;

    match kind {
        ExpressionKind::Variable => bind_variable(expr, &compiled, scope, pass),
        ExpressionKind::FunctionDef => {
            pass.cache.release(&mut expr.geometry);
            expr.slider = None;
            let function = statement
                .defined_name()
                .and_then(|name| compiled.to_function(name, scope));
            Ok(match function {
                Some(function) => Step {
                    scope: Some(scope.with_function(function)),
                    status: ExpressionStatus::Bound,
                    update: None,
                },
                None => Step::status(ExpressionStatus::Inert),
            })
        }
        ExpressionKind::Output => {
            pass.cache.release(&mut expr.geometry);
            expr.slider = None;
            let values = compiled.evaluate_constants("output", scope)?;
            log::info!("{} output: {values:?}", expr.id);
            expr.output = Some(values);
            Ok(Step::status(ExpressionStatus::Evaluated))
        }
        ExpressionKind::Unclassified => {
            pass.cache.release(&mut expr.geometry);
            expr.slider = None;
            Ok(Step::status(ExpressionStatus::Inert))
        }
        _ => plot(expr, &statement, &compiled, kind, scope, pass),
    }
}

fn bind_variable(
    expr: &mut Expression,
    compiled: &CompiledExpression,
    scope: &Scope,
    pass: &mut Pass<'_>,
) -> Result<Step, ExpressionError> {
    pass.cache.release(&mut expr.geometry);
    let name = expr.defined_name.clone().unwrap_or_default();
    let value = compiled.evaluate_constant(&name, scope)?;

    match expr.slider.as_mut() {
        Some(slider) if (slider.value - value).abs() <= SLIDER_TOLERANCE => {}
        Some(slider) => {
            slider.value = value;
            slider.min = slider.min.min(value);
            slider.max = slider.max.max(value);
        }
        None => expr.slider = Some(SliderSettings::new(value)),
    }

    Ok(Step {
        scope: Some(scope.with_variable(&name, value)),
        status: ExpressionStatus::Bound,
        update: None,
    })
}

fn plot(
    expr: &mut Expression,
    statement: &Statement,
    compiled: &CompiledExpression,
    kind: ExpressionKind,
    scope: &Scope,
    pass: &mut Pass<'_>,
) -> Result<Step, ExpressionError> {
    expr.slider = None;
    if kind.expected_arity() != Some(compiled.arity()) {
        return Err(ExpressionError::ClassificationAmbiguous {
            kind,
            arity: compiled.arity(),
        });
    }

    // `f(x, y) = …` wordt getekend én blijft aanroepbaar.
    let next_scope = match &statement.form {
        ExpressionForm::FunctionDef { name, .. } => compiled
            .to_function(name, scope)
            .map(|function| scope.with_function(function)),
        _ => None,
    };

    let mut parameters = expr.parameters.clone();
    if !statement.bound_arguments.is_empty() {
        let mut values = Vec::with_capacity(statement.bound_arguments.len());
        for argument in &statement.bound_arguments {
            let bound = CompiledExpression::compile(&[argument.as_str()], &[], scope)?;
            expr.dependencies.extend(bound.dependencies().iter().cloned());
            values.push(bound.evaluate_constant(argument, scope)?);
        }
        parameters = PlotParameters::from_positional(kind, &values)?.overlay(&expr.parameters);
    }

    if !expr.enabled {
        pass.cache.release(&mut expr.geometry);
        return Ok(Step {
            scope: next_scope,
            status: ExpressionStatus::Disabled,
            update: None,
        });
    }

    let bounds = parameters.resolve(kind, &pass.defaults)?;
    if expr.geometry.is_some() && !pass.needs_geometry(expr) {
        return Ok(Step {
            scope: next_scope,
            status: ExpressionStatus::Plotted,
            update: None,
        });
    }

    let source = compiled.bind(scope);
    let outcome = pass.cache.update(
        &mut expr.geometry,
        UpdateRequest {
            kind,
            bounds,
            source: &source,
        },
    )?;
    Ok(Step {
        scope: next_scope,
        status: ExpressionStatus::Plotted,
        update: Some(outcome.kind),
    })
}

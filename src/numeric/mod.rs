//! Numerieke evaluatie van expressiecomponenten via `meval`.
//!
//! `CompiledExpression::compile` parseert de componenten van een expressie en
//! doet één verkennende evaluatie met een registrerende context. Daarbij
//! worden vrije sweepvariabelen, gebruikte scopenamen en onbekende symbolen
//! verzameld, zodat de classificatie zuiver op de vorm kan werken en
//! onbekende symbolen als `CompilationError` terugkomen voordat er wordt
//! gesampled.

mod builtins;
mod scope;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use meval::{ContextProvider, Expr, FuncEvalError};

use crate::plot::{SampleError, SampleSource, is_sweep_variable};

pub use builtins::Builtins;
pub use scope::{Scope, UserFunction};

use scope::{call_function, lookup_variable};

/// Waarde die tijdens verkenning voor onbekende of vrije namen wordt gebruikt.
const SCAN_VALUE: f64 = 0.5;

/// Maximale editafstand voor een "bedoelde je"-suggestie.
const SUGGESTION_DISTANCE: usize = 2;

/// Fouttype bij het compileren van een expressie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationError {
    Empty,
    Syntax {
        component: usize,
        message: String,
    },
    UnknownVariable {
        name: String,
        suggestion: Option<String>,
    },
    UnknownFunction {
        name: String,
        suggestion: Option<String>,
    },
    ArgumentCount {
        name: String,
        expected: Option<usize>,
        got: usize,
    },
    NotConstant {
        name: String,
        free: Vec<String>,
    },
    Evaluation(String),
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "lege expressie"),
            Self::Syntax { component, message } => {
                write!(f, "syntaxfout in component {}: {message}", component + 1)
            }
            Self::UnknownVariable { name, suggestion } => {
                write!(f, "onbekende variabele `{name}`")?;
                write_suggestion(f, suggestion.as_deref())
            }
            Self::UnknownFunction { name, suggestion } => {
                write!(f, "onbekende functie `{name}`")?;
                write_suggestion(f, suggestion.as_deref())
            }
            Self::ArgumentCount {
                name,
                expected: Some(expected),
                got,
            } => write!(
                f,
                "functie `{name}` verwacht {expected} argumenten, kreeg er {got}"
            ),
            Self::ArgumentCount {
                name,
                expected: None,
                got,
            } => write!(f, "functie `{name}` accepteert geen {got} argumenten"),
            Self::NotConstant { name, free } => write!(
                f,
                "variabele `{name}` hangt af van sweepvariabelen ({})",
                free.join(", ")
            ),
            Self::Evaluation(reason) => write!(f, "expressie kon niet geëvalueerd worden: {reason}"),
        }
    }
}

impl std::error::Error for CompilationError {}

fn write_suggestion(f: &mut fmt::Formatter<'_>, suggestion: Option<&str>) -> fmt::Result {
    match suggestion {
        Some(candidate) => write!(f, "; bedoelde je `{candidate}`?"),
        None => Ok(()),
    }
}

/// Gecompileerde expressie met één of meer scalaire componenten.
pub struct CompiledExpression {
    components: Vec<Expr>,
    params: Vec<String>,
    free_variables: BTreeSet<String>,
    dependencies: BTreeSet<String>,
}

impl CompiledExpression {
    /// Compileert `components` tegen `scope`. Namen in `params` gelden als
    /// gebonden (functieparameters).
    pub fn compile<S: AsRef<str>>(
        components: &[S],
        params: &[String],
        scope: &Scope,
    ) -> Result<Self, CompilationError> {
        if components.is_empty() {
            return Err(CompilationError::Empty);
        }

        let mut parsed = Vec::with_capacity(components.len());
        for (index, source) in components.iter().enumerate() {
            let source = source.as_ref().trim();
            if source.is_empty() {
                return Err(CompilationError::Syntax {
                    component: index,
                    message: "lege component".to_owned(),
                });
            }
            let expr: Expr = source.parse().map_err(|error: meval::Error| {
                CompilationError::Syntax {
                    component: index,
                    message: error.to_string(),
                }
            })?;
            parsed.push(expr);
        }

        let scan = ScanContext {
            params,
            scope,
            seen: RefCell::new(Scan::default()),
        };
        for expr in &parsed {
            if let Err(error) = expr.eval_with_context(&scan) {
                return Err(map_meval_error(error));
            }
        }
        let scan = scan.seen.into_inner();
        scan.check(scope)?;

        Ok(Self {
            components: parsed,
            params: params.to_vec(),
            free_variables: scan.free,
            dependencies: scan.dependencies,
        })
    }

    /// Aantal componenten: 1 voor een scalair, 3 voor een tripel.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.components.len()
    }

    /// Gelezen sweepvariabelen, inclusief die via gebruikersfuncties.
    #[must_use]
    pub fn free_variables(&self) -> &BTreeSet<String> {
        &self.free_variables
    }

    /// Namen uit de scope waarvan deze expressie afhangt.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Evalueert alle componenten (hoogstens drie) met `bindings` voor de sweep.
    pub fn evaluate(
        &self,
        scope: &Scope,
        bindings: &[(&str, f64)],
        out: &mut [f64; 3],
    ) -> Result<(), SampleError> {
        let context = EvalContext { scope, bindings };
        for (slot, expr) in out.iter_mut().zip(&self.components) {
            *slot = expr
                .eval_with_context(&context)
                .map_err(|error| SampleError::Evaluation(error.to_string()))?;
        }
        Ok(())
    }

    /// Waarde van een constante scalaire expressie (een variabeledefinitie).
    pub fn evaluate_constant(&self, name: &str, scope: &Scope) -> Result<f64, CompilationError> {
        let [first, ..] = self.constant_components(name, scope)?;
        Ok(first)
    }

    /// Waarden van alle componenten van een constante expressie, voor
    /// `output(...)`.
    pub fn evaluate_constants(&self, name: &str, scope: &Scope) -> Result<Vec<f64>, CompilationError> {
        let out = self.constant_components(name, scope)?;
        Ok(out.into_iter().take(self.arity()).collect())
    }

    fn constant_components(&self, name: &str, scope: &Scope) -> Result<[f64; 3], CompilationError> {
        if !self.free_variables.is_empty() {
            return Err(CompilationError::NotConstant {
                name: name.to_owned(),
                free: self.free_variables.iter().cloned().collect(),
            });
        }
        let mut out = [0.0; 3];
        self.evaluate(scope, &[], &mut out)
            .map_err(|error| CompilationError::Evaluation(error.to_string()))?;
        Ok(out)
    }

    /// Maakt van een scalaire expressie een aanroepbare functie die de
    /// huidige `scope` meeneemt. Vectorwaardige expressies zijn niet aanroepbaar.
    #[must_use]
    pub fn to_function(&self, name: &str, scope: &Scope) -> Option<UserFunction> {
        let [body] = self.components.as_slice() else {
            return None;
        };
        let free_variables = self
            .free_variables
            .iter()
            .filter(|variable| !self.params.contains(variable))
            .cloned()
            .collect();
        Some(UserFunction {
            name: name.to_owned(),
            params: self.params.clone(),
            body: body.clone(),
            env: scope.clone(),
            free_variables,
        })
    }

    /// Koppelt de expressie aan een scope zodat ze gesampled kan worden.
    #[must_use]
    pub fn bind<'a>(&'a self, scope: &'a Scope) -> BoundExpression<'a> {
        BoundExpression {
            expression: self,
            scope,
        }
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("arity", &self.components.len())
            .field("free_variables", &self.free_variables)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Expressie plus scope; de bron voor de geometriebouwers.
pub struct BoundExpression<'a> {
    expression: &'a CompiledExpression,
    scope: &'a Scope,
}

impl SampleSource for BoundExpression<'_> {
    fn arity(&self) -> usize {
        self.expression.arity()
    }

    fn evaluate(&self, bindings: &[(&str, f64)], out: &mut [f64; 3]) -> Result<(), SampleError> {
        self.expression.evaluate(self.scope, bindings, out)
    }
}

struct EvalContext<'a> {
    scope: &'a Scope,
    bindings: &'a [(&'a str, f64)],
}

impl ContextProvider for EvalContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        lookup_variable(self.scope, self.bindings, name)
    }

    fn eval_func(&self, name: &str, args: &[f64]) -> Result<f64, FuncEvalError> {
        call_function(self.scope, self.bindings, name, args)
    }
}

#[derive(Debug, Default)]
struct Scan {
    free: BTreeSet<String>,
    dependencies: BTreeSet<String>,
    unknown_variables: Vec<String>,
    unknown_functions: Vec<String>,
    argument_errors: Vec<(String, Option<usize>, usize)>,
}

impl Scan {
    fn check(&self, scope: &Scope) -> Result<(), CompilationError> {
        if let Some(name) = self.unknown_variables.first() {
            return Err(CompilationError::UnknownVariable {
                name: name.clone(),
                suggestion: suggest(name, scope),
            });
        }
        if let Some(name) = self.unknown_functions.first() {
            return Err(CompilationError::UnknownFunction {
                name: name.clone(),
                suggestion: suggest(name, scope),
            });
        }
        if let Some((name, expected, got)) = self.argument_errors.first() {
            return Err(CompilationError::ArgumentCount {
                name: name.clone(),
                expected: *expected,
                got: *got,
            });
        }
        Ok(())
    }
}

/// Registrerende context: elke naam wordt opgelost, onbekende namen worden
/// genoteerd in plaats van de evaluatie af te breken.
struct ScanContext<'a> {
    params: &'a [String],
    scope: &'a Scope,
    seen: RefCell<Scan>,
}

impl ContextProvider for ScanContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        let mut seen = self.seen.borrow_mut();
        if is_sweep_variable(name) {
            seen.free.insert(name.to_owned());
            return Some(SCAN_VALUE);
        }
        if self.params.iter().any(|param| param == name) {
            return Some(SCAN_VALUE);
        }
        if let Some(value) = self.scope.variable(name) {
            seen.dependencies.insert(name.to_owned());
            return Some(value);
        }
        if let Some(value) = self.scope.builtins().context().get_var(name) {
            return Some(value);
        }
        if !seen.unknown_variables.iter().any(|known| known == name) {
            seen.unknown_variables.push(name.to_owned());
        }
        Some(SCAN_VALUE)
    }

    fn eval_func(&self, name: &str, args: &[f64]) -> Result<f64, FuncEvalError> {
        if let Some(function) = self.scope.function(name) {
            let mut seen = self.seen.borrow_mut();
            seen.dependencies.insert(name.to_owned());
            seen.free.extend(function.free_variables().iter().cloned());
            if args.len() != function.params().len() {
                seen.argument_errors
                    .push((name.to_owned(), Some(function.params().len()), args.len()));
            }
            return Ok(SCAN_VALUE);
        }
        match self.scope.builtins().context().eval_func(name, args) {
            Ok(value) => Ok(value),
            Err(FuncEvalError::UnknownFunction) => {
                let mut seen = self.seen.borrow_mut();
                if !seen.unknown_functions.iter().any(|known| known == name) {
                    seen.unknown_functions.push(name.to_owned());
                }
                Ok(SCAN_VALUE)
            }
            Err(error) => {
                let expected = match error {
                    FuncEvalError::NumberArgs(count) => Some(count),
                    _ => None,
                };
                self.seen
                    .borrow_mut()
                    .argument_errors
                    .push((name.to_owned(), expected, args.len()));
                Ok(SCAN_VALUE)
            }
        }
    }
}

fn map_meval_error(error: meval::Error) -> CompilationError {
    match error {
        meval::Error::UnknownVariable(name) => CompilationError::UnknownVariable {
            name,
            suggestion: None,
        },
        meval::Error::Function(name, FuncEvalError::UnknownFunction) => {
            CompilationError::UnknownFunction {
                name,
                suggestion: None,
            }
        }
        meval::Error::Function(name, _) => CompilationError::ArgumentCount {
            name,
            expected: None,
            got: 0,
        },
        other => CompilationError::Evaluation(other.to_string()),
    }
}

/// Dichtstbijzijnde bekende naam binnen `SUGGESTION_DISTANCE` bewerkingen.
fn suggest(name: &str, scope: &Scope) -> Option<String> {
    scope
        .names()
        .chain(Builtins::names().map(|candidate| candidate))
        .chain(crate::plot::SWEEP_VARIABLES.iter().map(|candidate| *candidate))
        .filter(|candidate| *candidate != name)
        .map(|candidate| (levenshtein::levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .min_by_key(|(distance, candidate)| (*distance, candidate.len()))
        .map(|(_, candidate)| candidate.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(components: &[&str], scope: &Scope) -> Result<CompiledExpression, CompilationError> {
        CompiledExpression::compile(components, &[], scope)
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn collects_free_sweep_variables() {
        let scope = Scope::default();
        let compiled = compile(&["cos(t)", "sin(t)", "t / 100"], &scope).unwrap();
        assert_eq!(compiled.arity(), 3);
        assert_eq!(names(compiled.free_variables()), vec!["t"]);
        assert!(compiled.dependencies().is_empty());
    }

    #[test]
    fn records_scope_dependencies() {
        let scope = Scope::default().with_variable("a", 2.0);
        let compiled = compile(&["a * x + y"], &scope).unwrap();
        assert_eq!(names(compiled.dependencies()), vec!["a"]);
        assert_eq!(names(compiled.free_variables()), vec!["x", "y"]);
    }

    #[test]
    fn unknown_variable_suggests_close_name() {
        let scope = Scope::default().with_variable("alpha", 1.0);
        let err = compile(&["alpah * x"], &scope).unwrap_err();
        assert_eq!(
            err,
            CompilationError::UnknownVariable {
                name: "alpah".into(),
                suggestion: Some("alpha".into()),
            }
        );
        assert!(err.to_string().contains("bedoelde je `alpha`"));
    }

    #[test]
    fn unknown_function_is_reported() {
        let err = compile(&["sinn(x)"], &Scope::default()).unwrap_err();
        assert!(matches!(
            err,
            CompilationError::UnknownFunction { ref name, suggestion: Some(_) } if name == "sinn"
        ));
    }

    #[test]
    fn wrong_user_function_arity_is_reported() {
        let root = Scope::default();
        let f = CompiledExpression::compile(&["a + b"], &["a".into(), "b".into()], &root)
            .unwrap()
            .to_function("f", &root)
            .unwrap();
        let scope = root.with_function(f);
        let err = compile(&["f(1)"], &scope).unwrap_err();
        assert_eq!(
            err,
            CompilationError::ArgumentCount {
                name: "f".into(),
                expected: Some(2),
                got: 1,
            }
        );
    }

    #[test]
    fn syntax_errors_name_the_component() {
        let err = compile(&["1", "2 +", "3"], &Scope::default()).unwrap_err();
        assert!(matches!(err, CompilationError::Syntax { component: 1, .. }));
    }

    #[test]
    fn evaluates_with_bindings() {
        let scope = Scope::default().with_variable("a", 3.0);
        let compiled = compile(&["a * x + y"], &scope).unwrap();
        let mut out = [0.0; 3];
        compiled.evaluate(&scope, &[("x", 2.0), ("y", 1.0)], &mut out).unwrap();
        assert_eq!(out[0], 7.0);
    }

    #[test]
    fn user_functions_are_callable_and_propagate_free_variables() {
        let root = Scope::default();
        let g = CompiledExpression::compile(&["a * t"], &["a".into()], &root)
            .unwrap()
            .to_function("g", &root)
            .unwrap();
        assert_eq!(names(g.free_variables()), vec!["t"]);
        let scope = root.with_function(g);
        let compiled = compile(&["g(2)", "0", "1"], &scope).unwrap();
        assert_eq!(names(compiled.free_variables()), vec!["t"]);

        let mut out = [0.0; 3];
        compiled.bind(&scope).evaluate(&[("t", 4.0)], &mut out).unwrap();
        assert_eq!(out, [8.0, 0.0, 1.0]);
    }

    #[test]
    fn constants_must_not_read_sweep_variables() {
        let scope = Scope::default();
        let compiled = compile(&["2 * pi"], &scope).unwrap();
        let value = compiled.evaluate_constant("k", &scope).unwrap();
        assert!((value - std::f64::consts::TAU).abs() < 1e-12);

        let compiled = compile(&["x + 1"], &scope).unwrap();
        assert!(matches!(
            compiled.evaluate_constant("k", &scope),
            Err(CompilationError::NotConstant { .. })
        ));
    }

    #[test]
    fn suggestions_draw_from_scope_builtins_and_sweep_variables() {
        let scope = Scope::default().with_variable("alpha", 1.0);
        assert_eq!(suggest("alpah", &scope), Some("alpha".into()));
        assert_eq!(suggest("sqrtt", &scope), Some("sqrt".into()));
        assert_eq!(suggest("tt", &scope), Some("t".into()));
        assert_eq!(suggest("alpha", &scope), None);
        assert_eq!(suggest("completely_unrelated", &scope), None);
    }

    #[test]
    fn vector_expressions_are_not_callable() {
        let scope = Scope::default();
        let compiled = compile(&["1", "2", "3"], &scope).unwrap();
        assert!(compiled.to_function("p", &scope).is_none());
    }
}

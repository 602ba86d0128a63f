//! Evaluatiescope: variabelen en gebruikersfuncties die eerdere expressies
//! hebben gedefinieerd.
//!
//! Een scope is onveranderlijk. `with_variable` en `with_function` geven een
//! nieuwe scope terug, zodat de orchestrator de scope expliciet van expressie
//! naar expressie doorgeeft en elke volledige ronde met een verse scope begint.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use meval::{ContextProvider, Expr, FuncEvalError};

use super::builtins::Builtins;

#[derive(Clone)]
pub struct Scope {
    variables: BTreeMap<String, f64>,
    functions: BTreeMap<String, Rc<UserFunction>>,
    builtins: Builtins,
}

impl Scope {
    #[must_use]
    pub fn new(builtins: Builtins) -> Self {
        Self {
            variables: BTreeMap::new(),
            functions: BTreeMap::new(),
            builtins,
        }
    }

    /// Nieuwe scope waarin `name` naar `value` verwijst. Een eerdere
    /// definitie met dezelfde naam, variabele of functie, wordt vervangen.
    #[must_use]
    pub fn with_variable(&self, name: &str, value: f64) -> Self {
        let mut next = self.clone();
        next.functions.remove(name);
        next.variables.insert(name.to_owned(), value);
        next
    }

    /// Nieuwe scope met `function` geregistreerd onder zijn naam.
    #[must_use]
    pub fn with_function(&self, function: UserFunction) -> Self {
        let mut next = self.clone();
        next.variables.remove(&function.name);
        next.functions
            .insert(function.name.clone(), Rc::new(function));
        next
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Rc<UserFunction>> {
        self.functions.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.functions.contains_key(name)
    }

    /// Alle door de gebruiker gedefinieerde namen.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables
            .keys()
            .chain(self.functions.keys())
            .map(String::as_str)
    }

    #[must_use]
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.functions.is_empty()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(Builtins::new())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("variables", &self.variables)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Functie `name(params) = body`, gebonden aan de scope waarin ze werd
/// gedefinieerd. Een functie kan zichzelf dus niet aanroepen.
pub struct UserFunction {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) body: Expr,
    pub(crate) env: Scope,
    /// Sweepvariabelen die de body leest zonder dat ze parameter zijn.
    pub(crate) free_variables: BTreeSet<String>,
}

impl UserFunction {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    #[must_use]
    pub fn free_variables(&self) -> &BTreeSet<String> {
        &self.free_variables
    }

    /// Roept de functie aan. Sweepwaarden van de aanroeper blijven zichtbaar
    /// voor vrije sweepvariabelen in de body. Evaluatiefouten leveren `NaN`.
    pub fn call(&self, args: &[f64], sweep: &[(&str, f64)]) -> Result<f64, FuncEvalError> {
        if args.len() != self.params.len() {
            return Err(FuncEvalError::NumberArgs(self.params.len()));
        }
        let context = CallContext {
            function: self,
            args,
            sweep,
        };
        Ok(self.body.eval_with_context(context).unwrap_or(f64::NAN))
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

struct CallContext<'a> {
    function: &'a UserFunction,
    args: &'a [f64],
    sweep: &'a [(&'a str, f64)],
}

impl ContextProvider for CallContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        if let Some(index) = self.function.params.iter().position(|p| p == name) {
            return self.args.get(index).copied();
        }
        lookup_variable(&self.function.env, self.sweep, name)
    }

    fn eval_func(&self, name: &str, args: &[f64]) -> Result<f64, FuncEvalError> {
        call_function(&self.function.env, self.sweep, name, args)
    }
}

/// Sweepwaarden, dan scopevariabelen, dan ingebouwde constanten.
pub(crate) fn lookup_variable(scope: &Scope, sweep: &[(&str, f64)], name: &str) -> Option<f64> {
    sweep
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
        .or_else(|| scope.variable(name))
        .or_else(|| scope.builtins().context().get_var(name))
}

/// Gebruikersfuncties gaan voor ingebouwde functies.
pub(crate) fn call_function(
    scope: &Scope,
    sweep: &[(&str, f64)],
    name: &str,
    args: &[f64],
) -> Result<f64, FuncEvalError> {
    match scope.function(name) {
        Some(function) => function.call(args, sweep),
        None => scope.builtins().context().eval_func(name, args),
    }
}

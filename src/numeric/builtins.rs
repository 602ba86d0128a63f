//! Ingebouwde functies en constanten bovenop de standaardcontext van `meval`.

use std::rc::Rc;

use meval::Context;
use rand::{Rng, rng};

/// Namen die `meval::Context::new()` zelf al levert.
const MEVAL_NAMES: &[&str] = &[
    "sqrt", "exp", "ln", "abs", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh",
    "tanh", "asinh", "acosh", "atanh", "floor", "ceil", "round", "signum", "atan2", "max", "min",
    "pi", "e",
];

/// Namen die hier worden toegevoegd.
const EXTRA_NAMES: &[&str] = &[
    "clamp", "lerp", "deg", "rad", "frac", "mod", "modulo", "sign", "sgn", "sec", "csc", "cot",
    "log", "log10", "log2", "cbrt", "and", "or", "xor", "not", "if", "select", "random", "rand",
    "tau",
];

/// Gedeelde, onveranderlijke context met alle ingebouwde functies.
///
/// De context wordt één keer per document opgebouwd en via `Rc` gedeeld door
/// alle scopes van een evaluatieronde.
#[derive(Clone)]
pub struct Builtins(Rc<Context<'static>>);

impl Builtins {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(build_context()))
    }

    #[must_use]
    pub fn context(&self) -> &Context<'static> {
        &self.0
    }

    /// Alle bekende ingebouwde namen, voor suggesties bij typfouten.
    pub fn names() -> impl Iterator<Item = &'static str> {
        MEVAL_NAMES.iter().chain(EXTRA_NAMES).copied()
    }

    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        Self::names().any(|candidate| candidate == name)
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Builtins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Builtins")
    }
}

fn build_context() -> Context<'static> {
    let mut context = Context::new();
    context.var("tau", std::f64::consts::TAU);
    context.func3("clamp", clamp);
    context.func3("lerp", lerp);
    context.func("deg", |value| value.to_degrees());
    context.func("rad", |value| value.to_radians());
    context.func("frac", |value| value.fract());
    context.func2("mod", modulo);
    context.func2("modulo", modulo);
    context.func("sign", f64::signum);
    context.func("sgn", f64::signum);
    context.func("sec", |value| 1.0 / value.cos());
    context.func("csc", |value| 1.0 / value.sin());
    context.func("cot", |value| 1.0 / value.tan());
    context.func("log", f64::ln);
    context.func("log10", f64::log10);
    context.func("log2", f64::log2);
    context.func("cbrt", f64::cbrt);
    context.func2("and", |a, b| boolean(to_boolean(a) && to_boolean(b)));
    context.func2("or", |a, b| boolean(to_boolean(a) || to_boolean(b)));
    context.func2("xor", |a, b| boolean(to_boolean(a) ^ to_boolean(b)));
    context.func("not", |value| boolean(!to_boolean(value)));
    context.funcn("if", conditional, 2..4);
    context.funcn("select", conditional, 2..4);
    context.funcn("random", random_value, 0..3);
    context.funcn("rand", random_value, 0..3);
    context
}

fn to_boolean(value: f64) -> bool {
    value != 0.0
}

fn boolean(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    let lower = min.min(max);
    let upper = min.max(max);
    value.max(lower).min(upper)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Modulo met het teken van de deler, zoals in de editor gebruikelijk is.
fn modulo(dividend: f64, divisor: f64) -> f64 {
    if divisor == 0.0 {
        return f64::NAN;
    }
    let remainder = dividend % divisor;
    if remainder == 0.0 {
        0.0
    } else if (remainder > 0.0) == (divisor > 0.0) {
        remainder
    } else {
        remainder + divisor
    }
}

fn random_value(values: &[f64]) -> f64 {
    let (lower, upper) = match values {
        [] => return rand::random::<f64>(),
        [end] if *end >= 0.0 => (0.0, *end),
        [end] => (*end, 0.0),
        [min, max, ..] => (min.min(*max), min.max(*max)),
    };
    if !(upper - lower).is_finite() || (upper - lower).abs() < f64::EPSILON {
        lower
    } else {
        rng().random_range(lower..upper)
    }
}

fn conditional(values: &[f64]) -> f64 {
    let chosen = if to_boolean(values[0]) {
        values.get(1)
    } else {
        values.get(2)
    };
    chosen.copied().unwrap_or(0.0)
}

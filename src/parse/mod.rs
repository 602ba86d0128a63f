//! Parser voor expressieregels uit de editor.
//!
//! Een regel is een commentaar (`// …`), een toekenning `naam = expr`, een
//! functiedefinitie `naam(p1, p2) = expr`, een plotdirectief
//! (`surface(expr, xMin, xMax, …)`) of een kale expressie. Tupels worden
//! geschreven als `[a, b, c]` of `(a, b, c)`.

pub mod latex;

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::plot::{ExpressionForm, ExpressionKind, is_sweep_variable};

pub use latex::normalize_latex;

/// Result type voor het parsen van expressieregels.
pub type ParseResult<T> = Result<T, ParseError>;

/// Beschrijft fouten tijdens het parsen van een expressieregel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Haakjes of accolades zijn niet gebalanceerd.
    #[error("ongebalanceerd scheidingsteken `{delimiter}`")]
    Unbalanced { delimiter: char },
    /// Een LaTeX-commando mist zijn argument.
    #[error("LaTeX-commando mist een argument")]
    MissingArgument,
    /// Een tupel bevat een lege component.
    #[error("component {index} is leeg")]
    EmptyComponent { index: usize },
    /// Een definitie heeft geen rechterlid.
    #[error("definitie van `{name}` heeft geen waarde")]
    EmptyDefinition { name: String },
    /// Een parameternaam is geen geldige identifier.
    #[error("ongeldige parameternaam `{0}`")]
    InvalidParameter(String),
    /// Dezelfde parameter komt twee keer voor.
    #[error("parameter `{0}` komt meer dan eens voor")]
    DuplicateParameter(String),
    /// Sweepvariabelen kunnen niet worden gedefinieerd.
    #[error("`{0}` is een sweepvariabele en kan niet worden gedefinieerd")]
    ReservedName(String),
    /// Een plotdirectief kreeg geen expressie.
    #[error("directief `{0}` verwacht een expressie")]
    MissingExpression(String),
    /// Een plotdirectief kreeg te veel grenswaarden.
    #[error("directief `{directive}` accepteert hoogstens {max} grenswaarden, kreeg {got}")]
    TooManyArguments {
        directive: String,
        max: usize,
        got: usize,
    },
}

/// Eén geparste expressieregel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub form: ExpressionForm,
    /// Scalaire componenten van de waarde (1 of meer).
    pub components: Vec<String>,
    /// Positionele grenswaarden van een directief, nog niet geëvalueerd.
    pub bound_arguments: Vec<String>,
}

impl Statement {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.components.len()
    }

    /// Naam die de regel in de scope bindt, als die er is.
    #[must_use]
    pub fn defined_name(&self) -> Option<&str> {
        match &self.form {
            ExpressionForm::Assignment { name } | ExpressionForm::FunctionDef { name, .. } => {
                Some(name)
            }
            ExpressionForm::Bare | ExpressionForm::Directive { .. } => None,
        }
    }

    /// Parameterlijst van een functiedefinitie, anders leeg.
    #[must_use]
    pub fn params(&self) -> &[String] {
        match &self.form {
            ExpressionForm::FunctionDef { params, .. } => params,
            _ => &[],
        }
    }
}

struct Directive {
    name: &'static str,
    kind: Option<ExpressionKind>,
    max_bounds: usize,
}

const DIRECTIVES: &[(&[&str], Directive)] = &[
    (
        &["surface", "surface3d"],
        Directive {
            name: "surface",
            kind: Some(ExpressionKind::Surface),
            max_bounds: 5,
        },
    ),
    (
        &["parametricline", "parametricline3d", "sl3"],
        Directive {
            name: "parametricline",
            kind: Some(ExpressionKind::ParametricLine),
            max_bounds: 2,
        },
    ),
    (
        &["parametricsurface", "parametricsurface3d", "ps3"],
        Directive {
            name: "parametricsurface",
            kind: Some(ExpressionKind::ParametricSurface),
            max_bounds: 5,
        },
    ),
    (
        &["vectorfield", "vectorfield3d", "vf3"],
        Directive {
            name: "vectorfield",
            kind: Some(ExpressionKind::VectorField),
            max_bounds: 6,
        },
    ),
    (
        &["point", "point3d", "p3"],
        Directive {
            name: "point",
            kind: Some(ExpressionKind::Point),
            max_bounds: 0,
        },
    ),
    (
        &["output", "o"],
        Directive {
            name: "output",
            kind: Some(ExpressionKind::Output),
            max_bounds: 0,
        },
    ),
    (
        &["plot"],
        Directive {
            name: "plot",
            kind: None,
            max_bounds: 6,
        },
    ),
];

fn identifier() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("geldige regex"))
}

fn definition() -> &'static Regex {
    static DEFINITION: OnceLock<Regex> = OnceLock::new();
    DEFINITION.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(\(([^()]*)\))?\s*=([^=].*|)$")
            .expect("geldige regex")
    })
}

fn directive_call() -> &'static Regex {
    static DIRECTIVE_CALL: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE_CALL
        .get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*)\s*\((.*)\)$").expect("geldige regex"))
}

/// Parseert een regel platte tekst. `Ok(None)` betekent commentaar of leeg.
pub fn parse_statement(input: &str) -> ParseResult<Option<Statement>> {
    let text = input.trim();
    if text.is_empty() || text.starts_with("//") {
        return Ok(None);
    }
    check_balanced(text)?;

    if let Some(statement) = parse_directive(text)? {
        return Ok(Some(statement));
    }
    if let Some(statement) = parse_definition(text)? {
        return Ok(Some(statement));
    }

    Ok(Some(Statement {
        form: ExpressionForm::Bare,
        components: split_value(text)?,
        bound_arguments: Vec::new(),
    }))
}

/// Zet eerst LaTeX om en parseert daarna de regel.
pub fn parse_latex_statement(input: &str) -> ParseResult<Option<Statement>> {
    if input.trim_start().starts_with("//") {
        return Ok(None);
    }
    parse_statement(&normalize_latex(input)?)
}

fn parse_directive(text: &str) -> ParseResult<Option<Statement>> {
    let Some(captures) = directive_call().captures(text) else {
        return Ok(None);
    };
    let keyword = captures[1].to_ascii_lowercase();
    let Some((_, directive)) = DIRECTIVES
        .iter()
        .find(|(aliases, _)| aliases.contains(&keyword.as_str()))
    else {
        return Ok(None);
    };

    // `surface(x)(y)` is geen directief maar een product.
    let inner = &captures[2];
    if check_balanced(inner).is_err() {
        return Ok(None);
    }

    let mut arguments = split_top_level(inner);
    if arguments.first().is_none_or(|first| first.trim().is_empty()) {
        return Err(ParseError::MissingExpression(directive.name.to_owned()));
    }
    let expression = arguments.remove(0);
    if arguments.len() > directive.max_bounds {
        return Err(ParseError::TooManyArguments {
            directive: directive.name.to_owned(),
            max: directive.max_bounds,
            got: arguments.len(),
        });
    }

    let mut bound_arguments = Vec::with_capacity(arguments.len());
    for (index, argument) in arguments.into_iter().enumerate() {
        let argument = argument.trim();
        if argument.is_empty() {
            return Err(ParseError::EmptyComponent { index: index + 1 });
        }
        bound_arguments.push(argument.to_owned());
    }

    Ok(Some(Statement {
        form: ExpressionForm::Directive {
            kind: directive.kind,
        },
        components: split_value(expression.trim())?,
        bound_arguments,
    }))
}

fn parse_definition(text: &str) -> ParseResult<Option<Statement>> {
    let Some(captures) = definition().captures(text) else {
        return Ok(None);
    };
    let name = captures[1].to_owned();
    let body = captures.get(4).map_or("", |m| m.as_str()).trim();

    // `z = f(x, y)` is de gebruikelijke notatie voor een oppervlak.
    if name == "z" && captures.get(2).is_none() {
        if body.is_empty() {
            return Err(ParseError::EmptyDefinition { name });
        }
        return Ok(Some(Statement {
            form: ExpressionForm::Bare,
            components: split_value(body)?,
            bound_arguments: Vec::new(),
        }));
    }
    if is_sweep_variable(&name) {
        return Err(ParseError::ReservedName(name));
    }
    if body.is_empty() {
        return Err(ParseError::EmptyDefinition { name });
    }

    let form = match captures.get(3) {
        Some(list) => {
            let mut params: Vec<String> = Vec::new();
            // `f() = 3` heeft een lege parameterlijst
            let list = list.as_str().trim();
            let segments = list.split(',').map(str::trim).filter(|_| !list.is_empty());
            for param in segments {
                if !identifier().is_match(param) {
                    return Err(ParseError::InvalidParameter(param.to_owned()));
                }
                if params.iter().any(|existing| existing == param) {
                    return Err(ParseError::DuplicateParameter(param.to_owned()));
                }
                params.push(param.to_owned());
            }
            ExpressionForm::FunctionDef { name, params }
        }
        None => ExpressionForm::Assignment { name },
    };

    Ok(Some(Statement {
        form,
        components: split_value(body)?,
        bound_arguments: Vec::new(),
    }))
}

/// Splitst een waarde in componenten. `[a, b, c]` en `(a, b, c)` zijn tupels;
/// alles anders is één scalaire component.
pub fn split_value(text: &str) -> ParseResult<Vec<String>> {
    let text = text.trim();
    let inner = match (text.chars().next(), text.chars().last()) {
        (Some('['), Some(']')) | (Some('('), Some(')')) if encloses(text) => {
            &text[1..text.len() - 1]
        }
        _ => return Ok(vec![text.to_owned()]),
    };

    let parts = split_top_level(inner);
    if parts.len() == 1 && text.starts_with('(') {
        // `(x + y)` is gewoon een scalair tussen haakjes.
        return Ok(vec![text.to_owned()]);
    }

    let mut components = Vec::with_capacity(parts.len());
    for (index, part) in parts.into_iter().enumerate() {
        let part = part.trim();
        if part.is_empty() {
            return Err(ParseError::EmptyComponent { index });
        }
        components.push(part.to_owned());
    }
    Ok(components)
}

/// Geeft aan of het eerste haakje pas op de laatste positie sluit.
fn encloses(text: &str) -> bool {
    let mut depth = 0usize;
    let last = text.len() - 1;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return index == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Splitst op komma's die niet binnen haakjes staan.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn check_balanced(text: &str) -> ParseResult<()> {
    let mut stack = Vec::new();
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(ParseError::Unbalanced { delimiter: c });
                }
            }
            _ => {}
        }
    }
    match stack.pop() {
        Some(open) => Err(ParseError::Unbalanced { delimiter: open }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Statement {
        parse_statement(input).unwrap().unwrap()
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_statement("// note").unwrap(), None);
        assert_eq!(parse_statement("   ").unwrap(), None);
    }

    #[test]
    fn bare_scalar_and_tuples() {
        let statement = parse("sin(x) * cos(y)");
        assert_eq!(statement.form, ExpressionForm::Bare);
        assert_eq!(statement.arity(), 1);

        let statement = parse("[cos(t), sin(t), t/100]");
        assert_eq!(statement.components, vec!["cos(t)", "sin(t)", "t/100"]);

        let statement = parse("(1, max(2, 3), 4)");
        assert_eq!(statement.components, vec!["1", "max(2, 3)", "4"]);

        // Parentheses around a scalar are not a tuple.
        assert_eq!(parse("(x + y)").arity(), 1);
        assert_eq!(parse("(x)*(y)").arity(), 1);
    }

    #[test]
    fn assignments_and_functions() {
        let statement = parse("a = 2.5");
        assert_eq!(
            statement.form,
            ExpressionForm::Assignment { name: "a".into() }
        );
        assert_eq!(statement.defined_name(), Some("a"));

        let statement = parse("f(x, y) = x + y");
        assert_eq!(
            statement.form,
            ExpressionForm::FunctionDef {
                name: "f".into(),
                params: vec!["x".into(), "y".into()],
            }
        );
        assert_eq!(statement.components, vec!["x + y"]);

        let statement = parse("k( ) = 3");
        assert_eq!(
            statement.form,
            ExpressionForm::FunctionDef {
                name: "k".into(),
                params: Vec::new(),
            }
        );
        assert_eq!(statement.components, vec!["3"]);
    }

    #[test]
    fn z_assignment_is_a_surface() {
        let statement = parse("z = x^2 - y^2");
        assert_eq!(statement.form, ExpressionForm::Bare);
    }

    #[test]
    fn definitions_are_validated() {
        assert_eq!(
            parse_statement("x = 3"),
            Err(ParseError::ReservedName("x".into()))
        );
        assert_eq!(
            parse_statement("f(a, a) = a"),
            Err(ParseError::DuplicateParameter("a".into()))
        );
        assert_eq!(
            parse_statement("f(1) = 2"),
            Err(ParseError::InvalidParameter("1".into()))
        );
        assert_eq!(
            parse_statement("f(a, ) = a"),
            Err(ParseError::InvalidParameter(String::new()))
        );
        assert_eq!(
            parse_statement("a = "),
            Err(ParseError::EmptyDefinition { name: "a".into() })
        );
    }

    #[test]
    fn directives_with_aliases_and_bounds() {
        let statement = parse("surface(x*y, -1, 1, -1, 1, 2)");
        assert_eq!(
            statement.form,
            ExpressionForm::Directive {
                kind: Some(ExpressionKind::Surface)
            }
        );
        assert_eq!(statement.bound_arguments, vec!["-1", "1", "-1", "1", "2"]);

        let statement = parse("sl3([cos(t), sin(t), t], 0, 2*pi)");
        assert_eq!(
            statement.form,
            ExpressionForm::Directive {
                kind: Some(ExpressionKind::ParametricLine)
            }
        );
        assert_eq!(statement.arity(), 3);
        assert_eq!(statement.bound_arguments, vec!["0", "2*pi"]);

        let statement = parse("plot([1, 2, 3])");
        assert_eq!(statement.form, ExpressionForm::Directive { kind: None });

        for input in ["output(2 * a)", "o(2 * a)"] {
            let statement = parse(input);
            assert_eq!(
                statement.form,
                ExpressionForm::Directive {
                    kind: Some(ExpressionKind::Output)
                }
            );
            assert_eq!(statement.components, vec!["2 * a"]);
        }
        assert!(matches!(
            parse_statement("output(a, 1)"),
            Err(ParseError::TooManyArguments { max: 0, got: 1, .. })
        ));
    }

    #[test]
    fn directive_errors() {
        assert_eq!(
            parse_statement("point()"),
            Err(ParseError::MissingExpression("point".into()))
        );
        assert!(matches!(
            parse_statement("sl3([t, t, t], 0, 1, 2)"),
            Err(ParseError::TooManyArguments { max: 2, got: 3, .. })
        ));
    }

    #[test]
    fn unknown_calls_are_plain_expressions() {
        let statement = parse("sin(x)");
        assert_eq!(statement.form, ExpressionForm::Bare);
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        assert_eq!(
            parse_statement("[1, 2"),
            Err(ParseError::Unbalanced { delimiter: '[' })
        );
        assert_eq!(
            parse_statement("(1, 2]"),
            Err(ParseError::Unbalanced { delimiter: ']' })
        );
        assert_eq!(
            parse_statement("[1, , 3]"),
            Err(ParseError::EmptyComponent { index: 1 })
        );
    }

    #[test]
    fn latex_statements() {
        let statement = parse_latex_statement(r"\operatorname{vf3}\left(\left[y,-x,0\right]\right)")
            .unwrap()
            .unwrap();
        assert_eq!(
            statement.form,
            ExpressionForm::Directive {
                kind: Some(ExpressionKind::VectorField)
            }
        );
        assert_eq!(statement.components, vec!["y", "-x", "0"]);

        let statement = parse_latex_statement(r"g\left(a\right)=\frac{a}{2}")
            .unwrap()
            .unwrap();
        assert_eq!(statement.params(), ["a".to_owned()]);
        assert_eq!(statement.components, vec!["((a)/(2))"]);
    }
}

//! Omzetting van LaTeX uit de formule-editor naar platte expressietekst.
//!
//! De editor levert bijvoorbeeld `\frac{1}{2}\sin\left(x\right)\cdot y^{2}`;
//! de numerieke evaluator verwacht `((1)/(2))*sin(x)*y^(2)`. Alleen de
//! constructies die de editor daadwerkelijk produceert worden ondersteund.

use super::ParseError;

/// Commando's die als functie worden gebruikt; `\sin x` wordt `sin(x)`.
const FUNCTION_COMMANDS: &[&str] = &[
    "sin", "cos", "tan", "sec", "csc", "cot", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "ln", "log", "exp",
];

/// Commando's die niets opleveren (spatiëring, opmaak).
const IGNORED_COMMANDS: &[&str] = &["left", "right", "quad", "qquad", "displaystyle", "limits"];

/// Zet LaTeX-invoer om naar tekst die `meval` kan parsen.
pub fn normalize_latex(input: &str) -> Result<String, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let converted = convert(&chars)?;
    Ok(insert_implicit_multiplication(&converted))
}

fn convert(chars: &[char]) -> Result<String, ParseError> {
    let mut out = String::with_capacity(chars.len());
    let mut pos = 0;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => pos = convert_command(chars, pos + 1, &mut out)?,
            '{' => {
                let (inner, next) = read_group(chars, pos)?;
                out.push('(');
                out.push_str(&convert(inner)?);
                out.push(')');
                pos = next;
            }
            '}' => return Err(ParseError::Unbalanced { delimiter: '}' }),
            '_' => {
                // Subscripts worden deel van de naam: x_{1} -> x_1.
                let (inner, next) = read_argument(chars, pos + 1)?;
                out.push('_');
                out.extend(inner.iter().filter(|c| c.is_ascii_alphanumeric()));
                pos = next;
            }
            '^' => {
                let (inner, next) = read_argument(chars, pos + 1)?;
                out.push_str("^(");
                out.push_str(&convert(inner)?);
                out.push(')');
                pos = next;
            }
            other => {
                out.push(other);
                pos += 1;
            }
        }
    }
    Ok(out)
}

/// Verwerkt het commando dat op `start` begint (na de backslash) en geeft
/// de positie na het commando terug.
fn convert_command(chars: &[char], start: usize, out: &mut String) -> Result<usize, ParseError> {
    let Some(&first) = chars.get(start) else {
        return Ok(start);
    };
    if !first.is_ascii_alphabetic() {
        match first {
            '{' => out.push('('),
            '}' => out.push(')'),
            ',' | ';' | ':' | '!' | ' ' => out.push(' '),
            other => out.push(other),
        }
        return Ok(start + 1);
    }

    let end = chars[start..]
        .iter()
        .position(|c| !c.is_ascii_alphabetic())
        .map_or(chars.len(), |offset| start + offset);
    let name: String = chars[start..end].iter().collect();

    match name.as_str() {
        "cdot" | "times" => {
            out.push('*');
            Ok(end)
        }
        "div" => {
            out.push('/');
            Ok(end)
        }
        "frac" | "dfrac" | "tfrac" => {
            let (numerator, next) = read_argument(chars, end)?;
            let (denominator, next) = read_argument(chars, next)?;
            out.push_str("((");
            out.push_str(&convert(numerator)?);
            out.push_str(")/(");
            out.push_str(&convert(denominator)?);
            out.push_str("))");
            Ok(next)
        }
        "sqrt" => {
            let next = skip_whitespace(chars, end);
            if chars.get(next) == Some(&'[') {
                let close = matching(chars, next, '[', ']')?;
                let degree = convert(&chars[next + 1..close])?;
                let (radicand, after) = read_argument(chars, close + 1)?;
                out.push_str("((");
                out.push_str(&convert(radicand)?);
                out.push_str(")^(1/(");
                out.push_str(&degree);
                out.push_str(")))");
                Ok(after)
            } else {
                let (radicand, after) = read_argument(chars, next)?;
                out.push_str("sqrt(");
                out.push_str(&convert(radicand)?);
                out.push(')');
                Ok(after)
            }
        }
        "operatorname" | "mathrm" | "text" | "mathit" => {
            let (inner, next) = read_argument(chars, end)?;
            out.extend(inner.iter().filter(|c| !c.is_whitespace()));
            Ok(next)
        }
        name if IGNORED_COMMANDS.contains(&name) => {
            // `\left.` en `\right.` hebben een onzichtbaar scheidingsteken.
            if matches!(name, "left" | "right") && chars.get(end) == Some(&'.') {
                return Ok(end + 1);
            }
            Ok(end)
        }
        name if FUNCTION_COMMANDS.contains(&name) => {
            out.push(' ');
            out.push_str(function_name(name));
            let next = skip_whitespace(chars, end);
            match chars.get(next) {
                Some('(' | '\\') | None => Ok(end),
                Some(_) => {
                    let (argument, after) = read_atom(chars, next)?;
                    out.push('(');
                    out.push_str(&convert(argument)?);
                    out.push(')');
                    Ok(after)
                }
            }
        }
        // Griekse letters en overige namen: \pi -> pi, \theta -> theta.
        other => {
            out.push(' ');
            out.push_str(other);
            Ok(end)
        }
    }
}

fn function_name(command: &str) -> &str {
    match command {
        "arcsin" => "asin",
        "arccos" => "acos",
        "arctan" => "atan",
        other => other,
    }
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

/// Leest een `{…}`-groep die op `open` begint.
fn read_group(chars: &[char], open: usize) -> Result<(&[char], usize), ParseError> {
    let close = matching(chars, open, '{', '}')?;
    Ok((&chars[open + 1..close], close + 1))
}

/// Argument van een commando: een `{…}`-groep of één teken (`\frac12`).
fn read_argument(chars: &[char], start: usize) -> Result<(&[char], usize), ParseError> {
    let pos = skip_whitespace(chars, start);
    match chars.get(pos) {
        Some('{') => read_group(chars, pos),
        Some('\\') => {
            let mut end = pos + 1;
            while chars.get(end).is_some_and(char::is_ascii_alphabetic) {
                end += 1;
            }
            if end == pos + 1 {
                end = (pos + 2).min(chars.len());
            }
            Ok((&chars[pos..end], end))
        }
        Some(_) => Ok((&chars[pos..=pos], pos + 1)),
        None => Err(ParseError::MissingArgument),
    }
}

/// Naam of getal na een functiecommando: `\sin 2x` neemt `2x`.
fn read_atom(chars: &[char], start: usize) -> Result<(&[char], usize), ParseError> {
    if chars.get(start) == Some(&'{') {
        return read_group(chars, start);
    }
    let end = chars[start..]
        .iter()
        .position(|c| !(c.is_ascii_alphanumeric() || *c == '.'))
        .map_or(chars.len(), |offset| start + offset);
    if end == start {
        return read_argument(chars, start);
    }
    Ok((&chars[start..end], end))
}

fn matching(chars: &[char], open: usize, left: char, right: char) -> Result<usize, ParseError> {
    let mut depth = 0usize;
    for (index, c) in chars.iter().enumerate().skip(open) {
        if *c == left {
            depth += 1;
        } else if *c == right {
            depth -= 1;
            if depth == 0 {
                return Ok(index);
            }
        }
    }
    Err(ParseError::Unbalanced { delimiter: left })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Number,
    Ident,
    Open,
    Close,
    Other,
}

/// Voegt `*` in waar de editor een vermenigvuldiging impliceert:
/// `2x`, `2(x)`, `(x)(y)`, `(x)y` en `pi x`.
fn insert_implicit_multiplication(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(chars.len() + 8);
    let mut previous: Option<Token> = None;
    let mut spaced = false;
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            spaced = true;
            pos += 1;
            continue;
        }

        let (token, end) = if c.is_ascii_digit() || (c == '.' && next_is_digit(&chars, pos)) {
            (Token::Number, scan_number(&chars, pos))
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = chars[pos..]
                .iter()
                .position(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map_or(chars.len(), |offset| pos + offset);
            (Token::Ident, end)
        } else if c == '(' || c == '[' {
            (Token::Open, pos + 1)
        } else if c == ')' || c == ']' {
            (Token::Close, pos + 1)
        } else {
            (Token::Other, pos + 1)
        };

        let implicit = match (previous, token) {
            (Some(Token::Number), Token::Ident | Token::Open)
            | (Some(Token::Close), Token::Number | Token::Ident | Token::Open) => true,
            (Some(Token::Ident), Token::Ident | Token::Number) => spaced,
            _ => false,
        };
        if implicit {
            out.push('*');
        } else if spaced && previous == Some(Token::Number) && token == Token::Number {
            out.push(' ');
        }

        out.extend(&chars[pos..end]);
        previous = Some(token);
        spaced = false;
        pos = end;
    }
    out
}

fn next_is_digit(chars: &[char], pos: usize) -> bool {
    chars.get(pos + 1).is_some_and(char::is_ascii_digit)
}

/// Getal inclusief decimalen en exponent (`1.5e-3`).
fn scan_number(chars: &[char], start: usize) -> usize {
    let mut pos = start;
    while chars.get(pos).is_some_and(|c| c.is_ascii_digit() || *c == '.') {
        pos += 1;
    }
    if matches!(chars.get(pos), Some('e' | 'E')) {
        let mut exponent = pos + 1;
        if matches!(chars.get(exponent), Some('+' | '-')) {
            exponent += 1;
        }
        if chars.get(exponent).is_some_and(char::is_ascii_digit) {
            pos = exponent;
            while chars.get(pos).is_some_and(char::is_ascii_digit) {
                pos += 1;
            }
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(input: &str) -> String {
        normalize_latex(input).unwrap()
    }

    #[test]
    fn strips_left_right_and_operators() {
        assert_eq!(normalize(r"\left(x+1\right)\cdot y"), "(x+1)*y");
        assert_eq!(normalize(r"a\times b"), "a*b");
    }

    #[test]
    fn fractions_and_roots() {
        assert_eq!(normalize(r"\frac{x}{2}"), "((x)/(2))");
        assert_eq!(normalize(r"\frac12"), "((1)/(2))");
        assert_eq!(normalize(r"\sqrt{x^{2}+1}"), "sqrt(x^(2)+1)");
        assert_eq!(normalize(r"\sqrt[3]{x}"), "((x)^(1/(3)))");
    }

    #[test]
    fn operator_names_and_greek_letters() {
        assert_eq!(
            normalize(r"\operatorname{surface3d}\left(x,-1,1\right)"),
            "surface3d(x,-1,1)"
        );
        assert_eq!(normalize(r"2\pi x"), "2*pi*x");
        assert_eq!(normalize(r"\theta_{1}"), "theta_1");
    }

    #[test]
    fn function_commands_take_an_argument() {
        assert_eq!(normalize(r"\sin\left(t\right)"), "sin(t)");
        assert_eq!(normalize(r"\cos t"), "cos(t)");
        assert_eq!(normalize(r"\arctan(x)"), "atan(x)");
    }

    #[test]
    fn implicit_multiplication() {
        assert_eq!(normalize("2x"), "2*x");
        assert_eq!(normalize("3(x+1)(y-1)"), "3*(x+1)*(y-1)");
        assert_eq!(normalize("(x)y"), "(x)*y");
        assert_eq!(normalize("log10(x)"), "log10(x)");
        assert_eq!(normalize("1.5e-3x"), "1.5e-3*x");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(normalize("[cos(t), sin(t), t/100]"), "[cos(t),sin(t),t/100]");
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert_eq!(
            normalize_latex(r"\frac{x}{2"),
            Err(ParseError::Unbalanced { delimiter: '{' })
        );
    }
}

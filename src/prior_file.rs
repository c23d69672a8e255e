//! Reader for `.prior` text files.
//!
//! Each non-comment line has the form `key = value`, where `value` is either
//! a bare number (a fixed parameter) or a constructor call such as
//! `Uniform(name='ra', minimum=0, maximum=2 * np.pi, boundary='periodic')`.
//! Class names may be module qualified; only the last path segment is used.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::conversion::generate_mass_parameters;
use crate::error::PeError;
use crate::prior::{Constraint, Prior};
use crate::prior_dict::PriorDict;

pub const BINARY_BLACK_HOLE_PRIOR: &str = include_str!("../priors/binary_black_holes.prior");

/// Keyword arguments that only carry presentation metadata.
const IGNORED_KEYWORDS: [&str; 4] = ["name", "latex_label", "unit", "boundary"];

type ParseResult<T> = std::result::Result<T, String>;

enum Entry {
    Prior(Prior),
    Constraint(Constraint),
}

#[derive(Debug, Clone, PartialEq)]
enum Argument {
    Number(f64),
    Text(String),
}

impl PriorDict {
    /// Read a prior set from a `.prior` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prior file: {:?}", path))?;
        let priors = text
            .parse()
            .with_context(|| format!("Invalid prior file: {:?}", path))?;
        Ok(priors)
    }

    /// The reference binary black hole prior, with the mass conversion installed.
    pub fn binary_black_hole() -> std::result::Result<Self, PeError> {
        let priors: PriorDict = BINARY_BLACK_HOLE_PRIOR.parse()?;
        Ok(priors.with_conversion(generate_mass_parameters))
    }
}

impl FromStr for PriorDict {
    type Err = PeError;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let mut priors = PriorDict::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let to_error = |message: String| PeError::PriorParse {
                line: idx + 1,
                message,
            };
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| to_error(format!("expected 'key = value', got '{line}'")))?;
            let key = key.trim();
            if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(to_error(format!("invalid parameter name '{key}'")));
            }
            match parse_entry(value.trim()).map_err(to_error)? {
                Entry::Prior(prior) => {
                    priors.insert(key, prior);
                }
                Entry::Constraint(constraint) => priors.insert_constraint(key, constraint),
            }
        }
        Ok(priors)
    }
}

fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_entry(value: &str) -> ParseResult<Entry> {
    if let Ok(peak) = evaluate(value) {
        return Prior::delta(peak)
            .map(Entry::Prior)
            .map_err(|err| err.to_string());
    }

    let open = value
        .find('(')
        .ok_or_else(|| format!("expected a number or a prior constructor, got '{value}'"))?;
    let inner = value[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| format!("unbalanced parentheses in '{value}'"))?;
    let class = value[..open].trim().rsplit('.').next().unwrap_or_default();

    let (positional, keywords) = parse_arguments(inner)?;
    let args = Arguments {
        class,
        positional,
        keywords,
    };

    let prior = match class {
        "Uniform" => {
            let [minimum, maximum] = args.numbers(["minimum", "maximum"], [None, None])?;
            Prior::uniform(minimum, maximum)
        }
        "DeltaFunction" => {
            let [peak] = args.numbers(["peak"], [None])?;
            Prior::delta(peak)
        }
        "Gaussian" | "Normal" => {
            let [mu, sigma] = args.numbers(["mu", "sigma"], [None, None])?;
            Prior::gaussian(mu, sigma)
        }
        "LogUniform" => {
            let [minimum, maximum] = args.numbers(["minimum", "maximum"], [None, None])?;
            Prior::log_uniform(minimum, maximum)
        }
        "PowerLaw" => {
            let [alpha, minimum, maximum] =
                args.numbers(["alpha", "minimum", "maximum"], [None, None, None])?;
            Prior::power_law(alpha, minimum, maximum)
        }
        "Sine" => {
            let [minimum, maximum] = args.numbers(["minimum", "maximum"], [Some(0.), Some(PI)])?;
            Prior::sine(minimum, maximum)
        }
        "Cosine" => {
            let [minimum, maximum] = args.numbers(
                ["minimum", "maximum"],
                [Some(-FRAC_PI_2), Some(FRAC_PI_2)],
            )?;
            Prior::cosine(minimum, maximum)
        }
        "Constraint" => {
            let [minimum, maximum] = args.numbers(["minimum", "maximum"], [None, None])?;
            return Constraint::new(minimum, maximum)
                .map(Entry::Constraint)
                .map_err(|err| err.to_string());
        }
        other => return Err(format!("unsupported prior class '{other}'")),
    };
    prior.map(Entry::Prior).map_err(|err| err.to_string())
}

struct Arguments<'a> {
    class: &'a str,
    positional: Vec<Argument>,
    keywords: HashMap<String, Argument>,
}

impl Arguments<'_> {
    /// Resolve `names` from positional then keyword arguments, falling back to `defaults`.
    fn numbers<const N: usize>(
        &self,
        names: [&str; N],
        defaults: [Option<f64>; N],
    ) -> ParseResult<[f64; N]> {
        // trailing positional strings are the name and label
        if self
            .positional
            .iter()
            .skip(N)
            .any(|arg| matches!(arg, Argument::Number(_)))
        {
            return Err(format!(
                "{} takes at most {N} numeric positional arguments",
                self.class
            ));
        }
        for key in self.keywords.keys() {
            if !names.contains(&key.as_str()) && !IGNORED_KEYWORDS.contains(&key.as_str()) {
                return Err(format!("{} got an unexpected argument '{key}'", self.class));
            }
        }

        let mut out = [0f64; N];
        for (i, name) in names.iter().enumerate() {
            let positional = self.positional.get(i);
            let keyword = self.keywords.get(*name);
            let value = match (positional, keyword) {
                (Some(_), Some(_)) => {
                    return Err(format!("{} got multiple values for '{name}'", self.class))
                }
                (Some(arg), None) | (None, Some(arg)) => match arg {
                    Argument::Number(x) => *x,
                    Argument::Text(_) => {
                        return Err(format!("{}: '{name}' must be numeric", self.class))
                    }
                },
                (None, None) => defaults[i]
                    .ok_or_else(|| format!("{} is missing '{name}'", self.class))?,
            };
            out[i] = value;
        }
        Ok(out)
    }
}

/// Split at top level commas, keeping quoted strings and nested parentheses intact.
fn split_top_level(text: &str) -> ParseResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced parentheses".to_string());
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err("unterminated string or parenthesis".to_string());
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn parse_arguments(inner: &str) -> ParseResult<(Vec<Argument>, HashMap<String, Argument>)> {
    let mut positional = Vec::new();
    let mut keywords = HashMap::new();
    for part in split_top_level(inner)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match keyword_split(part) {
            Some((key, value)) => {
                if keywords
                    .insert(key.to_string(), parse_argument(value)?)
                    .is_some()
                {
                    return Err(format!("duplicate argument '{key}'"));
                }
            }
            None => {
                if !keywords.is_empty() {
                    return Err(format!("positional argument '{part}' after keyword arguments"));
                }
                positional.push(parse_argument(part)?);
            }
        }
    }
    Ok((positional, keywords))
}

/// `key=value` at top level, or `None` for a positional argument.
fn keyword_split(part: &str) -> Option<(&str, &str)> {
    let (key, value) = part.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value.trim()))
}

fn parse_argument(value: &str) -> ParseResult<Argument> {
    let value = value.trim();
    for q in ['\'', '"'] {
        if let Some(text) = value
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
        {
            return Ok(Argument::Text(text.to_string()));
        }
    }
    evaluate(value).map(Argument::Number)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    Open,
    Close,
}

fn tokenize(text: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let value = match name.as_str() {
                    "pi" | "np.pi" | "numpy.pi" | "math.pi" => PI,
                    "inf" | "np.inf" | "numpy.inf" => f64::INFINITY,
                    _ => return Err(format!("unknown name '{name}'")),
                };
                tokens.push(Token::Number(value));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// Evaluate an arithmetic expression over numbers and `pi`.
fn evaluate(text: &str) -> ParseResult<f64> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Expression { tokens, pos: 0 };
    let value = parser.sum()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input in '{text}'"));
    }
    Ok(value)
}

struct Expression {
    tokens: Vec<Token>,
    pos: usize,
}

impl Expression {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn sum(&mut self) -> ParseResult<f64> {
        let mut value = self.product()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> ParseResult<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if op == Token::Star { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn unary(&mut self) -> ParseResult<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> ParseResult<f64> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Power) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> ParseResult<f64> {
        match self.next() {
            Some(Token::Number(x)) => Ok(x),
            Some(Token::Open) => {
                let value = self.sum()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("expected ')'".to_string()),
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn expressions() {
        assert_eq!(evaluate("2 * np.pi").unwrap(), 2. * PI);
        assert_eq!(evaluate("-1e-3").unwrap(), -1e-3);
        assert_eq!(evaluate("(1 + 2) * 3 / 4").unwrap(), 2.25);
        assert_eq!(evaluate("2 ** 3").unwrap(), 8.);
        assert!(evaluate("2 *").is_err());
        assert!(evaluate("foo").is_err());
    }

    #[test]
    fn parses_tutorial_priors() {
        let text = "\
# Gaussian model
mu = Uniform(0, 5, 'mu')
sigma = core.prior.Uniform(name='sigma', minimum=0, maximum=10)
offset = 1.5  # fixed
";
        let priors: PriorDict = text.parse().unwrap();
        assert_eq!(priors.get("mu"), Some(&Prior::uniform(0., 5.).unwrap()));
        assert_eq!(priors.get("sigma"), Some(&Prior::uniform(0., 10.).unwrap()));
        assert_eq!(priors.get("offset"), Some(&Prior::delta(1.5).unwrap()));
    }

    #[test]
    fn defaults_for_angles() {
        let priors: PriorDict = "dec = Cosine(name='dec')\ntheta_jn = Sine()".parse().unwrap();
        assert_eq!(
            priors.get("dec"),
            Some(&Prior::cosine(-FRAC_PI_2, FRAC_PI_2).unwrap())
        );
        assert_eq!(priors.get("theta_jn"), Some(&Prior::sine(0., PI).unwrap()));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = "mu = Uniform(0, 5)\nsigma = Weird(1)".parse::<PriorDict>().unwrap_err();
        assert_eq!(
            err,
            PeError::PriorParse {
                line: 2,
                message: "unsupported prior class 'Weird'".to_string()
            }
        );
        assert!("mu = Uniform(5, 0)".parse::<PriorDict>().is_err());
        assert!("mu = Uniform(minimum=0, maximum=5, minimum=1)"
            .parse::<PriorDict>()
            .is_err());
        assert!("mu Uniform(0, 5)".parse::<PriorDict>().is_err());
        assert!("mu = Gaussian(mu=0, width=1)".parse::<PriorDict>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let priors = PriorDict::binary_black_hole().unwrap();
        let reparsed: PriorDict = priors.to_string().parse().unwrap();
        assert_eq!(priors, reparsed);
    }

    #[test]
    fn binary_black_hole_reference() {
        let priors = PriorDict::binary_black_hole().unwrap();
        assert_eq!(priors.len(), 14);
        assert_eq!(priors.search_keys().len(), 14);
        assert!(priors.constraint("mass_1").is_some());
        match priors.get("luminosity_distance") {
            Some(Prior::PowerLaw {
                alpha,
                minimum,
                maximum,
            }) => {
                assert_relative_eq!(*alpha, 2.);
                assert_relative_eq!(*minimum, 50.);
                assert_relative_eq!(*maximum, 2000.);
            }
            other => panic!("unexpected prior {other:?}"),
        }
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaussian.prior");
        std::fs::write(&path, "mu = Uniform(0, 5)\nsigma = Uniform(0, 10)\n").unwrap();
        let priors = PriorDict::from_file(&path).unwrap();
        assert_eq!(priors.search_keys(), vec!["mu", "sigma"]);
        assert!(PriorDict::from_file(dir.path().join("missing.prior")).is_err());
    }
}

//! Parameter kinds, their pattern fragments and decoded values.

use std::fmt;
use std::str::FromStr;

use strum::EnumString;

use super::SignatureError;

const INT: &str = r"-?\d+";
const UINT: &str = r"\d+";
const REAL: &str = r"-?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

/// Kind of token accepted at one position of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ParamKind {
    /// C-style identifier: a letter or underscore followed by alphanumerics.
    Ident,
    /// Signed decimal integer.
    Int,
    /// Unsigned decimal integer.
    Uint,
    /// Decimal real number with optional exponent.
    Real,
    /// Double-quoted string; `\"` and `\\` are unescaped.
    Text,
    /// Any run of non-whitespace characters.
    Word,
    /// Hexadecimal byte sequence, optionally prefixed with `0x`.
    Hex,
    /// One or more whitespace-separated words.
    Words,
    /// One or more whitespace-separated signed integers.
    Ints,
    /// One or more whitespace-separated reals.
    Reals,
    /// Fixed text that must appear verbatim and is not captured.
    #[strum(disabled)]
    Literal(String),
}

impl ParamKind {
    /// Creates a literal token.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Parses a whitespace-separated shape description such as
    /// `"int ',' int text"`. Single-quoted tokens become literals.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnknownParamKind`] for unrecognised tokens.
    pub fn parse_shape(description: &str) -> Result<Vec<Self>, SignatureError> {
        description.split_whitespace().map(Self::parse_token).collect()
    }

    fn parse_token(token: &str) -> Result<Self, SignatureError> {
        if let Some(inner) = token
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Ok(Self::literal(inner));
        }
        Self::from_str(token).map_err(|_| SignatureError::UnknownParamKind {
            token: token.to_owned(),
        })
    }

    /// Whether the token produces a decoded value.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Pattern fragment matching this token. Contains no capture groups.
    pub(crate) fn fragment(&self) -> String {
        match self {
            Self::Ident => r"[A-Za-z_][A-Za-z0-9_]*".to_owned(),
            Self::Int => INT.to_owned(),
            Self::Uint => UINT.to_owned(),
            Self::Real => REAL.to_owned(),
            Self::Text => r#""(?:[^"\\]|\\.)*""#.to_owned(),
            Self::Word => r"\S+".to_owned(),
            Self::Hex => r"(?:0[xX])?(?:[0-9A-Fa-f]{2})+".to_owned(),
            Self::Words => r"\S+(?:[ \t]+\S+)*".to_owned(),
            Self::Ints => format!(r"{INT}(?:[ \t]+{INT})*"),
            Self::Reals => format!(r"{REAL}(?:[ \t]+{REAL})*"),
            Self::Literal(text) => regex::escape(text),
        }
    }

    /// Converts captured text into its native value.
    pub(crate) fn convert(&self, raw: &str) -> Result<ParamValue, SignatureError> {
        let value = match self {
            Self::Ident => ParamValue::Ident(raw.to_owned()),
            Self::Int => ParamValue::Int(parse_number(self, raw)?),
            Self::Uint => ParamValue::Uint(parse_number(self, raw)?),
            Self::Real => ParamValue::Real(parse_number(self, raw)?),
            Self::Text => ParamValue::Text(unquote(raw)),
            Self::Word => ParamValue::Word(raw.to_owned()),
            Self::Hex => ParamValue::Bytes(decode_hex(self, raw)?),
            Self::Words => ParamValue::Words(raw.split_whitespace().map(str::to_owned).collect()),
            Self::Ints => ParamValue::Ints(
                raw.split_whitespace()
                    .map(|item| parse_number(self, item))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Reals => ParamValue::Reals(
                raw.split_whitespace()
                    .map(|item| parse_number(self, item))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Literal(text) => ParamValue::Word(text.clone()),
        };
        Ok(value)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ident => "ident",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Real => "real",
            Self::Text => "text",
            Self::Word => "word",
            Self::Hex => "hex",
            Self::Words => "words",
            Self::Ints => "ints",
            Self::Reals => "reals",
            Self::Literal(text) => return write!(f, "'{text}'"),
        };
        f.write_str(name)
    }
}

/// A decoded parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Identifier.
    Ident(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Real number.
    Real(f64),
    /// Unquoted string contents.
    Text(String),
    /// Single word.
    Word(String),
    /// Decoded bytes.
    Bytes(Vec<u8>),
    /// Word list.
    Words(Vec<String>),
    /// Integer list.
    Ints(Vec<i64>),
    /// Real list.
    Reals(Vec<f64>),
}

impl ParamValue {
    /// Signed integer value, widening unsigned values that fit.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Uint(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Unsigned integer value.
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(value) => Some(*value),
            Self::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Real value.
    #[must_use]
    pub const fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Textual value of identifiers, strings and words.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ident(value) | Self::Text(value) | Self::Word(value) => Some(value),
            _ => None,
        }
    }

    /// Decoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// Word list.
    #[must_use]
    pub fn as_words(&self) -> Option<&[String]> {
        match self {
            Self::Words(value) => Some(value),
            _ => None,
        }
    }

    /// Integer list.
    #[must_use]
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Ints(value) => Some(value),
            _ => None,
        }
    }

    /// Real list.
    #[must_use]
    pub fn as_reals(&self) -> Option<&[f64]> {
        match self {
            Self::Reals(value) => Some(value),
            _ => None,
        }
    }
}

fn parse_number<T>(kind: &ParamKind, raw: &str) -> Result<T, SignatureError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|error| SignatureError::conversion(kind, raw, error))
}

fn decode_hex(kind: &ParamKind, raw: &str) -> Result<Vec<u8>, SignatureError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex::decode(digits).map_err(|error| SignatureError::conversion(kind, raw, error))
}

/// Strips the surrounding quotes and resolves backslash escapes.
fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(raw);
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                text.push(escaped);
            }
        } else {
            text.push(ch);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("int", ParamKind::Int)]
    #[case("HEX", ParamKind::Hex)]
    #[case("words", ParamKind::Words)]
    #[case("'->'", ParamKind::literal("->"))]
    fn parses_tokens(#[case] token: &str, #[case] expected: ParamKind) {
        assert_eq!(ParamKind::parse_token(token).expect("parse token"), expected);
    }

    #[test]
    fn rejects_unknown_tokens() {
        let error = ParamKind::parse_shape("int float").expect_err("float is unknown");
        assert!(matches!(error, SignatureError::UnknownParamKind { token } if token == "float"));
    }

    #[test]
    fn literal_tokens_are_not_captured() {
        assert!(!ParamKind::literal(",").is_captured());
        assert!(ParamKind::Real.is_captured());
    }

    #[rstest]
    #[case(ParamKind::Int, "-42", ParamValue::Int(-42))]
    #[case(ParamKind::Uint, "7", ParamValue::Uint(7))]
    #[case(ParamKind::Real, "1.5e2", ParamValue::Real(150.0))]
    #[case(ParamKind::Text, r#""say \"hi\"""#, ParamValue::Text("say \"hi\"".to_owned()))]
    #[case(ParamKind::Hex, "0x0aFF", ParamValue::Bytes(vec![0x0a, 0xff]))]
    #[case(ParamKind::Ints, "1 -2  3", ParamValue::Ints(vec![1, -2, 3]))]
    #[case(
        ParamKind::Words,
        "pick up\tcup",
        ParamValue::Words(vec!["pick".to_owned(), "up".to_owned(), "cup".to_owned()])
    )]
    fn converts_captured_text(#[case] kind: ParamKind, #[case] raw: &str, #[case] expected: ParamValue) {
        assert_eq!(kind.convert(raw).expect("convert"), expected);
    }

    #[test]
    fn reports_integer_overflow() {
        let error = ParamKind::Int
            .convert("99999999999999999999")
            .expect_err("overflow");
        assert!(matches!(error, SignatureError::Conversion { kind, .. } if kind == "int"));
    }

    #[test]
    fn value_accessors_widen_integers() {
        assert_eq!(ParamValue::Uint(5).as_int(), Some(5));
        assert_eq!(ParamValue::Int(-1).as_uint(), None);
        assert_eq!(ParamValue::Text("x".to_owned()).as_str(), Some("x"));
        assert_eq!(ParamValue::Real(1.0).as_str(), None);
    }
}

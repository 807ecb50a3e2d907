//! Compiled signatures and their evaluation.

use std::fmt;
use std::sync::Arc;

use regex::{Captures, Regex};

use crate::message::Command;

use super::{ParamKind, ParamValue, SignatureError};

/// Handler bound to a shape.
pub type Handler<R> = Arc<dyn Fn(&[ParamValue]) -> R + Send + Sync>;

/// Parser hook for signatures that declare no shapes.
pub type RawParser<R> = Arc<dyn Fn(&[String]) -> R + Send + Sync>;

pub(super) struct Shape<R> {
    pub(super) group: String,
    pub(super) params: Vec<(String, ParamKind)>,
    pub(super) handler: Option<Handler<R>>,
}

pub(super) enum Matcher<R> {
    Compiled { regex: Regex, shapes: Vec<Shape<R>> },
    Raw(RawParser<R>),
}

/// Result of evaluating a signature against a command.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMatch<R> {
    /// Index of the governing shape in declaration order.
    pub shape: usize,
    /// Decoded values in declaration order.
    pub values: Vec<ParamValue>,
    /// Handler result, when the shape is bound to a handler.
    pub result: Option<R>,
}

/// Accepted parameter shapes for one command.
pub struct Signature<R> {
    command_name: String,
    matcher: Matcher<R>,
}

impl<R> Signature<R> {
    pub(super) fn from_parts(command_name: String, matcher: Matcher<R>) -> Self {
        Self {
            command_name,
            matcher,
        }
    }

    /// Always-matching signature that hands the split parameter string to
    /// `parser`.
    ///
    /// Parameters are split on whitespace; double-quoted runs stay together
    /// with their quotes removed.
    #[must_use]
    pub fn raw<F>(command_name: impl AsRef<str>, parser: F) -> Self
    where
        F: Fn(&[String]) -> R + Send + Sync + 'static,
    {
        Self {
            command_name: command_name.as_ref().trim().to_lowercase(),
            matcher: Matcher::Raw(Arc::new(parser)),
        }
    }

    /// Case-folded command name this signature accepts.
    #[must_use]
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Master pattern, or `None` for raw signatures.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        match &self.matcher {
            Matcher::Compiled { regex, .. } => Some(regex.as_str()),
            Matcher::Raw(_) => None,
        }
    }

    /// Returns `true` when `command` would be accepted.
    #[must_use]
    pub fn is_match(&self, command: &Command) -> bool {
        if command.name() != self.command_name {
            return false;
        }
        match &self.matcher {
            Matcher::Compiled { regex, .. } => regex.is_match(command.parameters()),
            Matcher::Raw(_) => true,
        }
    }

    /// Validates and decodes `command`, invoking the bound handler if any.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::NameMismatch`] when the command is for a
    /// different name, [`SignatureError::NoMatch`] when no shape accepts the
    /// parameters, and [`SignatureError::Conversion`] when a captured token
    /// does not fit its native type.
    pub fn analyze(&self, command: &Command) -> Result<SignatureMatch<R>, SignatureError> {
        if command.name() != self.command_name {
            return Err(SignatureError::NameMismatch {
                expected: self.command_name.clone(),
                actual: command.name().to_owned(),
            });
        }
        match &self.matcher {
            Matcher::Compiled { regex, shapes } => {
                let (shape, values) = self.decode_compiled(regex, shapes, command.parameters())?;
                let result = shapes
                    .get(shape)
                    .and_then(|s| s.handler.as_ref())
                    .map(|handler| handler(&values));
                Ok(SignatureMatch {
                    shape,
                    values,
                    result,
                })
            }
            Matcher::Raw(parser) => {
                let words = split_parameters(command.parameters());
                let result = parser(&words);
                Ok(SignatureMatch {
                    shape: 0,
                    values: words.into_iter().map(ParamValue::Word).collect(),
                    result: Some(result),
                })
            }
        }
    }

    /// Like [`Signature::analyze`] but requires a handler result.
    ///
    /// # Errors
    ///
    /// Everything [`Signature::analyze`] returns, plus
    /// [`SignatureError::Unbound`] when the matching shape only declares types.
    pub fn call(&self, command: &Command) -> Result<R, SignatureError> {
        let matched = self.analyze(command)?;
        matched.result.ok_or(SignatureError::Unbound {
            shape: matched.shape,
        })
    }

    fn decode_compiled(
        &self,
        regex: &Regex,
        shapes: &[Shape<R>],
        parameters: &str,
    ) -> Result<(usize, Vec<ParamValue>), SignatureError> {
        let no_match = || SignatureError::NoMatch {
            command: self.command_name.clone(),
            parameters: parameters.to_owned(),
        };
        let captures = regex.captures(parameters).ok_or_else(no_match)?;
        let (index, shape) = shapes
            .iter()
            .enumerate()
            .find(|(_, shape)| captures.name(&shape.group).is_some())
            .ok_or_else(no_match)?;
        let values = shape
            .params
            .iter()
            .map(|(group, kind)| convert_group(&captures, group, kind))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((index, values))
    }
}

impl<R> fmt::Debug for Signature<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("command_name", &self.command_name)
            .field("pattern", &self.pattern())
            .finish()
    }
}

fn convert_group(
    captures: &Captures<'_>,
    group: &str,
    kind: &ParamKind,
) -> Result<ParamValue, SignatureError> {
    let raw = captures
        .name(group)
        .map(|m| m.as_str())
        .ok_or_else(|| SignatureError::conversion(kind, "", "group did not participate"))?;
    kind.convert(raw)
}

/// Splits on whitespace, keeping double-quoted runs together.
pub(crate) fn split_parameters(parameters: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for ch in parameters.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if quoted && ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            quoted = !quoted;
        } else if ch.is_whitespace() && !quoted {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

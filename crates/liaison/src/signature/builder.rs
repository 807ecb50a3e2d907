//! Accumulates shapes and compiles them into one master pattern.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use super::matcher::{Handler, Matcher, Shape, Signature};
use super::{ParamKind, ParamValue, SIGNATURE_TARGET, SignatureError};

/// Builder for a [`Signature`].
///
/// Shapes are tried in declaration order; the first one that matches a
/// parameter string governs it.
pub struct SignatureBuilder<R> {
    command_name: String,
    shapes: Vec<(Vec<ParamKind>, Option<Handler<R>>)>,
}

impl<R> SignatureBuilder<R> {
    /// Starts a signature for `command_name`.
    #[must_use]
    pub fn new(command_name: impl AsRef<str>) -> Self {
        Self {
            command_name: command_name.as_ref().trim().to_lowercase(),
            shapes: Vec::new(),
        }
    }

    /// Declares a shape bound to `handler`, which receives the decoded values
    /// in declaration order (literals excluded).
    #[must_use]
    pub fn handler<P, F>(mut self, params: P, handler: F) -> Self
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(&[ParamValue]) -> R + Send + Sync + 'static,
    {
        self.shapes
            .push((params.into_iter().collect(), Some(Arc::new(handler))));
        self
    }

    /// Declares a shape bound to its ordered type list only; matching it
    /// decodes values without invoking anything.
    #[must_use]
    pub fn types<P>(mut self, params: P) -> Self
    where
        P: IntoIterator<Item = ParamKind>,
    {
        self.shapes.push((params.into_iter().collect(), None));
        self
    }

    /// Declares a type-only shape from a textual description such as
    /// `"int ',' int"`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnknownParamKind`] for unrecognised tokens.
    pub fn shape_spec(self, description: &str) -> Result<Self, SignatureError> {
        Ok(self.types(ParamKind::parse_shape(description)?))
    }

    /// Declares a handler-bound shape from a textual description.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnknownParamKind`] for unrecognised tokens.
    pub fn handler_spec<F>(self, description: &str, handler: F) -> Result<Self, SignatureError>
    where
        F: Fn(&[ParamValue]) -> R + Send + Sync + 'static,
    {
        Ok(self.handler(ParamKind::parse_shape(description)?, handler))
    }

    /// Compiles every declared shape into a single anchored alternation.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::NoShapes`] when nothing was declared and
    /// [`SignatureError::Pattern`] if the generated pattern fails to compile.
    pub fn build(self) -> Result<Signature<R>, SignatureError> {
        if self.shapes.is_empty() {
            return Err(SignatureError::NoShapes {
                command: self.command_name,
            });
        }

        let mut alternatives = Vec::with_capacity(self.shapes.len());
        let mut shapes = Vec::with_capacity(self.shapes.len());
        for (index, (kinds, handler)) in self.shapes.into_iter().enumerate() {
            let group = format!("s{index}");
            let mut params = Vec::new();
            let mut body = String::new();
            let mut previous_captured = None;
            for (position, kind) in kinds.iter().enumerate() {
                let captured = kind.is_captured();
                if let Some(prev) = previous_captured {
                    body.push_str(if prev && captured { r"\s+" } else { r"\s*" });
                }
                previous_captured = Some(captured);
                if captured {
                    let param_group = format!("s{index}p{position}");
                    body.push_str(&format!("(?P<{param_group}>{})", kind.fragment()));
                    params.push((param_group, kind.clone()));
                } else {
                    body.push_str(&kind.fragment());
                }
            }
            alternatives.push(format!("(?P<{group}>{body})"));
            shapes.push(Shape {
                group,
                params,
                handler,
            });
        }

        let pattern = format!(r"^\s*(?:{})\s*$", alternatives.join("|"));
        debug!(
            target: SIGNATURE_TARGET,
            command = %self.command_name,
            shapes = shapes.len(),
            %pattern,
            "compiled signature"
        );
        let regex = Regex::new(&pattern)?;
        Ok(Signature::from_parts(
            self.command_name,
            Matcher::Compiled { regex, shapes },
        ))
    }
}

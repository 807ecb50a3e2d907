//! Declarative parameter signatures.
//!
//! A signature lists the parameter shapes a command accepts. Each shape is
//! an ordered sequence of [`ParamKind`] tokens and is bound either to a
//! handler or to its type list alone. [`SignatureBuilder::build`] compiles
//! all shapes into one anchored alternation; evaluating a command runs that
//! pattern once, takes the first shape that matched and converts its
//! captures to [`ParamValue`]s.
//!
//! ```ignore
//! let signature = SignatureBuilder::new("move")
//!     .handler([ParamKind::Real, ParamKind::Real], |values| values.len())
//!     .build()?;
//! ```

mod builder;
mod errors;
mod matcher;
mod param;

pub use self::builder::SignatureBuilder;
pub use self::errors::SignatureError;
pub use self::matcher::{Handler, RawParser, Signature, SignatureMatch};
pub use self::param::{ParamKind, ParamValue};

pub(crate) const SIGNATURE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signature");

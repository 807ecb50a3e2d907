//! Command and response values exchanged between modules.
//!
//! Names are case-folded on construction so pairing and the sort-merge scans
//! in the correlation engine can compare them byte-wise. Everything except
//! the routing metadata is fixed once a message has been built.

use std::fmt;

/// Identifier meaning "unspecified": pairs only with another unspecified id.
pub const UNSPECIFIED_ID: i32 = -1;

/// Opaque handle identifying the connection a command arrived on.
///
/// The transport collaborator allocates handles; the core only carries them
/// from the command to the response so the reply can be routed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginHandle(u64);

impl OriginHandle {
    /// Wraps a transport-assigned connection identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Routing metadata carried alongside a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routing {
    /// Module that produced the message.
    pub source: Option<String>,
    /// Module the message is addressed to.
    pub destination: Option<String>,
    /// Connection the originating command arrived on.
    pub origin: Option<OriginHandle>,
}

impl Routing {
    /// Routing for a reply: source and destination swap, origin is kept.
    fn reversed(&self) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
            origin: self.origin,
        }
    }
}

/// A request for another module to do something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    parameters: String,
    id: i32,
    routing: Routing,
}

impl Command {
    /// Builds a command with an unspecified id.
    #[must_use]
    pub fn new(name: impl AsRef<str>, parameters: impl Into<String>) -> Self {
        Self {
            name: normalise_name(name.as_ref()),
            parameters: parameters.into(),
            id: UNSPECIFIED_ID,
            routing: Routing::default(),
        }
    }

    /// Sets the correlation id. Negative values mean "unspecified".
    #[must_use]
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = normalise_id(id);
        self
    }

    /// Sets the producing module.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.routing.source = Some(source.into());
        self
    }

    /// Sets the addressed module.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.routing.destination = Some(destination.into());
        self
    }

    /// Records the connection the command arrived on.
    #[must_use]
    pub fn with_origin(mut self, origin: OriginHandle) -> Self {
        self.routing.origin = Some(origin);
        self
    }

    /// Case-folded command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw parameter string.
    #[must_use]
    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// Returns `true` when the parameter string holds more than whitespace.
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameters.trim().is_empty()
    }

    /// Correlation id, or [`UNSPECIFIED_ID`].
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Routing metadata.
    #[must_use]
    pub const fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Mutable routing metadata; the only part of a command that may change.
    pub const fn routing_mut(&mut self) -> &mut Routing {
        &mut self.routing
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        write_parameters(f, &self.parameters)?;
        write_id(f, self.id)
    }
}

/// The answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    name: String,
    parameters: String,
    id: i32,
    success: bool,
    routing: Routing,
}

impl Response {
    /// Builds a free-standing response with an unspecified id.
    #[must_use]
    pub fn new(name: impl AsRef<str>, parameters: impl Into<String>, success: bool) -> Self {
        Self {
            name: normalise_name(name.as_ref()),
            parameters: parameters.into(),
            id: UNSPECIFIED_ID,
            success,
            routing: Routing::default(),
        }
    }

    /// Builds the response to `command`, copying its name and id and
    /// reversing its routing.
    #[must_use]
    pub fn from_command(command: &Command, success: bool, parameters: impl Into<String>) -> Self {
        Self {
            name: command.name.clone(),
            parameters: parameters.into(),
            id: command.id,
            success,
            routing: command.routing.reversed(),
        }
    }

    /// Successful response echoing the command parameters.
    #[must_use]
    pub fn success_for(command: &Command) -> Self {
        Self::from_command(command, true, command.parameters.clone())
    }

    /// Synthetic failure echoing the command name, parameters and id.
    #[must_use]
    pub fn failure_for(command: &Command) -> Self {
        Self::from_command(command, false, command.parameters.clone())
    }

    /// Sets the correlation id. Negative values mean "unspecified".
    #[must_use]
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = normalise_id(id);
        self
    }

    /// Sets the producing module.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.routing.source = Some(source.into());
        self
    }

    /// Case-folded response name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw parameter string.
    #[must_use]
    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// Correlation id, or [`UNSPECIFIED_ID`].
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Whether the command succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Routing metadata.
    #[must_use]
    pub const fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Mutable routing metadata.
    pub const fn routing_mut(&mut self) -> &mut Routing {
        &mut self.routing
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        write_parameters(f, &self.parameters)?;
        f.write_str(if self.success { " 1" } else { " 0" })?;
        write_id(f, self.id)
    }
}

/// A command together with the response it was paired with.
///
/// When correlation timed out the response is the synthetic failure built by
/// [`Response::failure_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponsePair {
    /// The command that was sent.
    pub command: Command,
    /// The paired or synthesised response.
    pub response: Response,
}

impl CommandResponsePair {
    /// Pairs a command with its response.
    #[must_use]
    pub const fn new(command: Command, response: Response) -> Self {
        Self { command, response }
    }

    /// Pairs a command with a synthetic failure.
    #[must_use]
    pub fn failed(command: Command) -> Self {
        let response = Response::failure_for(&command);
        Self { command, response }
    }
}

/// Returns `true` when `response` answers `command`.
///
/// Names must match (both are case-folded at construction) and either both
/// ids are unspecified or they are equal.
#[must_use]
pub fn is_paired(command: &Command, response: &Response) -> bool {
    command.name == response.name && command.id == response.id
}

fn normalise_name(name: &str) -> String {
    name.trim().to_lowercase()
}

const fn normalise_id(id: i32) -> i32 {
    if id < 0 { UNSPECIFIED_ID } else { id }
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &str) -> fmt::Result {
    if parameters.is_empty() {
        return Ok(());
    }
    f.write_str(" \"")?;
    for ch in parameters.chars() {
        if ch == '"' {
            f.write_str("\\\"")?;
        } else {
            write!(f, "{ch}")?;
        }
    }
    f.write_str("\"")
}

fn write_id(f: &mut fmt::Formatter<'_>, id: i32) -> fmt::Result {
    if id == UNSPECIFIED_ID {
        Ok(())
    } else {
        write!(f, " @{id}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn names_are_case_folded() {
        let command = Command::new("  MoveArm ", "");
        assert_eq!(command.name(), "movearm");
    }

    #[test]
    fn negative_ids_normalise_to_unspecified() {
        assert_eq!(Command::new("a", "").with_id(-7).id(), UNSPECIFIED_ID);
        assert_eq!(Response::new("a", "", true).with_id(-2).id(), UNSPECIFIED_ID);
    }

    #[rstest]
    #[case(UNSPECIFIED_ID, UNSPECIFIED_ID, true)]
    #[case(3, 3, true)]
    #[case(3, 4, false)]
    #[case(UNSPECIFIED_ID, 4, false)]
    #[case(4, UNSPECIFIED_ID, false)]
    fn pairing_compares_ids(#[case] command_id: i32, #[case] response_id: i32, #[case] paired: bool) {
        let command = Command::new("grab", "").with_id(command_id);
        let response = Response::new("GRAB", "", true).with_id(response_id);
        assert_eq!(is_paired(&command, &response), paired);
    }

    #[test]
    fn pairing_requires_equal_names() {
        let command = Command::new("grab", "");
        let response = Response::new("release", "", true);
        assert!(!is_paired(&command, &response));
    }

    #[test]
    fn failure_echoes_command() {
        let command = Command::new("say", "hello")
            .with_id(9)
            .with_source("speech")
            .with_destination("hri")
            .with_origin(OriginHandle::new(4));
        let failure = Response::failure_for(&command);
        assert_eq!(failure.name(), "say");
        assert_eq!(failure.parameters(), "hello");
        assert_eq!(failure.id(), 9);
        assert!(!failure.success());
        assert_eq!(failure.routing().source.as_deref(), Some("hri"));
        assert_eq!(failure.routing().destination.as_deref(), Some("speech"));
        assert_eq!(failure.routing().origin, Some(OriginHandle::new(4)));
        assert!(is_paired(&command, &failure));
    }

    #[rstest]
    #[case(Command::new("alive", ""), "alive")]
    #[case(Command::new("say", "hi \"you\"").with_id(2), "say \"hi \\\"you\\\"\" @2")]
    fn commands_render_wire_text(#[case] command: Command, #[case] expected: &str) {
        assert_eq!(command.to_string(), expected);
    }

    #[test]
    fn responses_render_success_flag() {
        let response = Response::new("go", "1 2", false).with_id(0);
        assert_eq!(response.to_string(), "go \"1 2\" 0 @0");
    }
}

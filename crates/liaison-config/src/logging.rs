//! Log rendering and the per-area `tracing` targets of the middleware.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Root of every target the middleware logs under.
pub const MIDDLEWARE_TARGET: &str = "liaison";

/// How log records are rendered.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, with the module name as a span field.
    #[default]
    Json,
    /// Single-line text for operators watching a terminal.
    Compact,
}

/// Middleware area whose events share one `tracing` target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogArea {
    /// Dispatch loops, system commands and manager lifecycle.
    Dispatch,
    /// Response pooling and send/wait exchanges.
    Correlation,
    /// Executer state machines and worker threads.
    Executer,
    /// Executer registration.
    Registry,
    /// Parameter signature compilation and matching.
    Signature,
    /// Execution observer failures.
    Events,
}

impl LogArea {
    /// `tracing` target carrying this area's events, e.g. `liaison::dispatch`.
    #[must_use]
    pub fn target(self) -> String {
        let area: &'static str = self.into();
        format!("{MIDDLEWARE_TARGET}::{area}")
    }

    /// Level enabled for the area by the default filter.
    ///
    /// Correlation and signature events fire per poll tick or per command, so
    /// they stay quiet unless asked for.
    #[must_use]
    pub const fn default_level(self) -> &'static str {
        match self {
            Self::Correlation | Self::Signature => "warn",
            Self::Dispatch | Self::Executer | Self::Registry | Self::Events => "info",
        }
    }
}

/// Builds a filter expression with `base` as the fallback directive followed
/// by each area's default level.
#[must_use]
pub fn area_filter(base: &str) -> String {
    std::iter::once(base.to_owned())
        .chain(
            LogArea::iter()
                .filter(|area| area.default_level() != base)
                .map(|area| format!("{}={}", area.target(), area.default_level())),
        )
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("JSON", LogFormat::Json)]
    #[case("compact", LogFormat::Compact)]
    fn parses_formats_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[rstest]
    #[case(LogArea::Dispatch, "liaison::dispatch")]
    #[case(LogArea::Correlation, "liaison::correlation")]
    #[case(LogArea::Events, "liaison::events")]
    fn areas_map_to_targets(#[case] area: LogArea, #[case] target: &str) {
        assert_eq!(area.target(), target);
    }

    #[test]
    fn area_filter_quietens_chatty_areas() {
        assert_eq!(
            area_filter("info"),
            "info,liaison::correlation=warn,liaison::signature=warn"
        );
    }

    #[test]
    fn area_filter_keeps_base_first() {
        let filter = area_filter("debug");
        assert!(filter.starts_with("debug,"));
        assert_eq!(filter.split(',').count(), 7);
    }
}

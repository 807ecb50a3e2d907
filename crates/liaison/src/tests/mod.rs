//! Behaviour suites for the middleware core.

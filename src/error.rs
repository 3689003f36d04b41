//! # Error Types
//!
//! Library-level error taxonomy for the suite. Each subsystem defines its own
//! `thiserror`-derived error enum; [`NstsError`] aggregates them so that
//! `?` works uniformly across module boundaries. Application entry points
//! (`main.rs`, the client/server engine loops) work in terms of
//! `anyhow::Result` and convert into it with `?` at the call site, the same
//! way the benchmark runner's `main.rs` does for its own library errors.

use thiserror::Error;

/// Errors raised while parsing or operating on a [`crate::units::Quantity`].
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("cannot parse '{input}' as a {kind} value")]
    Parse { input: String, kind: &'static str },

    #[error("unknown magnitude suffix '{suffix}' for {kind}")]
    UnknownMagnitude { suffix: String, kind: &'static str },
}

/// Errors raised by the options subsystem.
#[derive(Debug, Error)]
pub enum OptionError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("option '{name}' expects a {expected} value, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("invalid value for option '{name}': {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: UnitError,
    },
}

/// Errors raised by the wire protocol and message framing layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message line: {0}")]
    Malformed(String),

    #[error("failed to decode message params: {0}")]
    Decode(String),

    #[error("expected message type '{expected}', got '{got}'")]
    UnexpectedType { expected: String, got: String },

    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },
}

/// Raised when the peer closes the connection, expectedly or not.
#[derive(Debug, Error)]
#[error("connection closed by peer")]
pub struct ConnectionClosed;

/// Errors raised while a profile's executor is running.
#[derive(Debug, Error)]
pub enum ProfileRuntimeError {
    #[error("profile '{0}' is not installed on this host")]
    NotSupported(String),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("subprocess for profile '{profile}' exited with {status}: {output}")]
    SubprocessFailed {
        profile: String,
        status: String,
        output: String,
    },

    #[error("unexpected output from subprocess for profile '{profile}': {detail}")]
    UnexpectedOutput { profile: String, detail: String },

    #[error("{0}")]
    Other(String),
}

/// Errors raised while parsing a suite file or command-line short form.
#[derive(Debug, Error)]
pub enum SuiteParseError {
    #[error("{context}: test section is missing required 'profile' key")]
    MissingProfile { context: String },

    #[error("{context}: {detail}")]
    Malformed { context: String, detail: String },

    #[error("{context}: {source}")]
    InvalidOption {
        context: String,
        #[source]
        source: OptionError,
    },
}

/// Top-level aggregate error returned by library-level `Result`s.
#[derive(Debug, Error)]
pub enum NstsError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Option(#[from] OptionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    ConnectionClosed(#[from] ConnectionClosed),

    #[error(transparent)]
    Profile(#[from] ProfileRuntimeError),

    #[error(transparent)]
    SuiteParse(#[from] SuiteParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

use anyhow::Error;
use std::fmt::Display;

/// The error taxonomy used across the bundling pipeline.
///
/// `MissingDependency` is deliberately not a variant here: a missing import
/// is not fatal, and is instead recorded in a bundle's `missing_imports` set
/// (see `bundle_manifest::Bundle`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Invalid CLI/API arguments, e.g. `--shell` not among the entrypoints.
    Configuration,
    /// The analyzer could not parse a file at all.
    MalformedDocument,
    /// The merger emitted a module-rewrite diagnostic. Core-level callers
    /// discard these; library users can still observe them via `message()`.
    ModuleRewriteConflict,
    /// Reading or writing a file on disk failed.
    Io,
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Kind::Configuration => "configuration",
                Kind::MalformedDocument => "malformed_document",
                Kind::ModuleRewriteConflict => "module_rewrite_conflict",
                Kind::Io => "io",
            }
        )
    }
}

/// A fatal bundler error, tagged with the taxonomy `Kind` it belongs to.
///
/// Declared separately from `anyhow::Error` so library code can match on
/// `kind()` without downcasting, while CLI code can still print the full
/// chain via `anyhow`'s `{:#}` formatting.
#[derive(Debug)]
pub struct BundlerErr {
    kind: Kind,
    err: Error,
}

impl BundlerErr {
    pub fn new(kind: Kind, err: impl Into<Error>) -> Self {
        let err = err.into();
        if err.is::<BundlerErr>() {
            // unwrap is safe: we just checked the downcast succeeds
            let inner = err.downcast::<BundlerErr>().unwrap();
            Self {
                kind: inner.kind,
                err: inner.err,
            }
        } else {
            Self { kind, err }
        }
    }

    pub fn configuration(err: impl Into<Error>) -> Self {
        Self::new(Kind::Configuration, err)
    }

    pub fn malformed_document(err: impl Into<Error>) -> Self {
        Self::new(Kind::MalformedDocument, err)
    }

    pub fn module_rewrite_conflict(err: impl Into<Error>) -> Self {
        Self::new(Kind::ModuleRewriteConflict, err)
    }

    pub fn io(err: impl Into<Error>) -> Self {
        Self::new(Kind::Io, err)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn message(&self) -> String {
        format!("{:#}", self.err)
    }
}

impl Display for BundlerErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.err)
    }
}

impl std::error::Error for BundlerErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

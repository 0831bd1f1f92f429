use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{ChainSnapshot, Symbol, Ticker};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network failure, non-2xx status, open circuit, missing input file.
    Unavailable,
    /// HTTP 429 from the upstream.
    RateLimited,
    /// The caller asked for something the upstream cannot answer.
    InvalidRequest,
    /// Upstream answered with a payload that could not be understood.
    Internal,
}

/// Structured error returned by every source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message)
    }

    fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the same call may succeed on a later cycle.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Unavailable | SourceErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Reference list of candidate companies, before yield filtering.
pub trait UniverseSource: Send + Sync {
    fn id(&self) -> &'static str;

    fn constituents<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>>;
}

/// Trailing dividend yield and next ex-dividend date lookup.
pub trait DividendSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Returns one ticker per requested symbol, in request order. Symbols the
    /// upstream does not know come back with a zero yield.
    fn dividends<'a>(
        &'a self,
        symbols: &'a [Symbol],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>>;
}

/// Options-chain snapshot provider.
pub trait ChainSource: Send + Sync {
    fn id(&self) -> &'static str;

    fn snapshot<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot, SourceError>> + Send + 'a>>;
}

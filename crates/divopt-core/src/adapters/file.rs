use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::source::{DividendSource, SourceError, UniverseSource};
use crate::universe::enrich;
use crate::{CalendarDate, Symbol, Ticker};

/// Universe read from a local ticker file.
///
/// One entry per line, either a bare symbol or `SYMBOL,yield[,YYYY-MM-DD]`.
/// The yield is a fraction (`0.031`) or a percentage with a `%` suffix
/// (`3.1%`). Blank lines and `#` comments are ignored; malformed lines are
/// logged and skipped. Bare symbols are enriched through the dividend source
/// when one is configured.
#[derive(Clone)]
pub struct FileUniverse {
    path: PathBuf,
    dividends: Option<Arc<dyn DividendSource>>,
}

impl FileUniverse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dividends: None,
        }
    }

    pub fn with_dividends(mut self, dividends: Arc<dyn DividendSource>) -> Self {
        self.dividends = Some(dividends);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Ticker>, SourceError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound => SourceError::unavailable(format!(
                    "ticker file '{}' does not exist",
                    self.path.display()
                )),
                _ => SourceError::unavailable(format!(
                    "failed to read ticker file '{}': {error}",
                    self.path.display()
                )),
            })?;

        let mut known = Vec::new();
        let mut bare = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            match parse_line(line) {
                Ok(Some(Entry::Known(ticker))) => known.push(ticker),
                Ok(Some(Entry::Bare(symbol))) => bare.push(symbol),
                Ok(None) => {}
                Err(reason) => tracing::warn!(
                    path = %self.path.display(),
                    line = number + 1,
                    %reason,
                    "skipping ticker file entry"
                ),
            }
        }

        tracing::info!(
            path = %self.path.display(),
            with_yield = known.len(),
            bare = bare.len(),
            "loaded ticker file"
        );
        known.extend(enrich(bare, self.dividends.as_deref()).await?);
        Ok(known)
    }
}

impl UniverseSource for FileUniverse {
    fn id(&self) -> &'static str {
        "file"
    }

    fn constituents<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
        Box::pin(self.load())
    }
}

#[derive(Debug, PartialEq)]
enum Entry {
    Known(Ticker),
    Bare(Symbol),
}

fn parse_line(line: &str) -> Result<Option<Entry>, String> {
    let content = line.split('#').next().unwrap_or_default().trim();
    if content.is_empty() {
        return Ok(None);
    }

    let mut fields = content.split(',').map(str::trim);
    let symbol = Symbol::parse(fields.next().unwrap_or_default()).map_err(|error| error.to_string())?;
    let Some(raw_yield) = fields.next().filter(|field| !field.is_empty()) else {
        return Ok(Some(Entry::Bare(symbol)));
    };

    let dividend_yield = parse_yield(raw_yield)?;
    let ex_dividend_date = fields
        .next()
        .filter(|field| !field.is_empty())
        .map(CalendarDate::parse)
        .transpose()
        .map_err(|error| error.to_string())?;

    Ticker::new(symbol, dividend_yield, ex_dividend_date)
        .map(|ticker| Some(Entry::Known(ticker)))
        .map_err(|error| error.to_string())
}

fn parse_yield(raw: &str) -> Result<f64, String> {
    let (number, scale) = match raw.strip_suffix('%') {
        Some(percent) => (percent.trim(), 100.0),
        None => (raw, 1.0),
    };
    number
        .parse::<f64>()
        .map(|value| value / scale)
        .map_err(|_| format!("invalid dividend yield '{raw}'"))
}

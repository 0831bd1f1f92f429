use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::http_client::{HttpClient, HttpRequest};
use crate::source::{DividendSource, SourceError, UniverseSource};
use crate::universe::enrich;
use crate::{Symbol, Ticker};

/// Public S&P 500 constituents list.
pub const DEFAULT_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

/// Index constituents downloaded as CSV and enriched with dividend data.
///
/// The CSV needs a header row; symbols are read from the `Symbol` column, or
/// the first column when no header matches.
#[derive(Clone)]
pub struct IndexUniverse {
    url: String,
    http_client: Arc<dyn HttpClient>,
    dividends: Arc<dyn DividendSource>,
}

impl IndexUniverse {
    pub fn new(
        url: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        dividends: Arc<dyn DividendSource>,
    ) -> Self {
        Self {
            url: url.into(),
            http_client,
            dividends,
        }
    }

    async fn load(&self) -> Result<Vec<Ticker>, SourceError> {
        let request = HttpRequest::get(&self.url).with_timeout(Duration::from_secs(20));
        let response = self.http_client.execute(request).await.map_err(|error| {
            SourceError::unavailable(format!(
                "failed to download constituents: {}",
                error.message()
            ))
        })?;
        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "constituents list returned status {}",
                response.status
            )));
        }

        let symbols = parse_constituents(&response.body)?;
        tracing::info!(url = %self.url, constituents = symbols.len(), "downloaded index constituents");
        enrich(symbols, Some(self.dividends.as_ref())).await
    }
}

impl UniverseSource for IndexUniverse {
    fn id(&self) -> &'static str {
        "index"
    }

    fn constituents<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
        Box::pin(self.load())
    }
}

fn parse_constituents(csv: &str) -> Result<Vec<Symbol>, SourceError> {
    let mut lines = csv.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| SourceError::internal("constituents list is empty"))?;
    let column = split_row(header)
        .iter()
        .position(|name| name.eq_ignore_ascii_case("symbol"))
        .unwrap_or(0);

    let symbols = lines
        .filter_map(|line| {
            let cell = split_row(line).into_iter().nth(column)?;
            match Symbol::parse(&cell) {
                Ok(symbol) => Some(symbol),
                Err(error) => {
                    tracing::debug!(cell, %error, "skipping constituent");
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    if symbols.is_empty() {
        return Err(SourceError::internal("constituents list contains no symbols"));
    }
    Ok(symbols)
}

/// Split one CSV row, honouring double-quoted cells.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

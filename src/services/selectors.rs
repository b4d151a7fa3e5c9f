// src/services/selectors.rs

//! Selector engine.
//!
//! Turns a parsed listing page into raw rows using a source's compiled CSS
//! selectors. No filtering happens here; empty values are left for the
//! normalizer to judge.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{FieldSelectors, RawRow, SourceConfig};
use crate::utils::resolve_url;

/// Extracts raw rows from a parsed document.
pub trait RowExtractor {
    /// Rows in document order. The iterator is lazy; calling `rows` again
    /// on the same document starts over.
    fn rows<'a>(&'a self, document: &'a Html) -> Box<dyn Iterator<Item = RawRow> + 'a>;
}

/// [`RowExtractor`] backed by `scraper` CSS selectors.
#[derive(Debug, Clone)]
pub struct CssSelectors {
    entries: Selector,
    fields: Vec<(String, Selector)>,
    link_attr: String,
    base_url: Url,
}

impl CssSelectors {
    /// Compile every selector of `source`. Fails on the first unparsable
    /// selector or an invalid base URL.
    pub fn compile(source: &SourceConfig) -> Result<Self> {
        let entries = Self::parse_selector(&source.entries)?;
        let fields = source
            .fields
            .iter()
            .map(|(field, selector)| {
                Ok::<_, AppError>((field.to_string(), Self::parse_selector(selector)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let base_url = Url::parse(&source.base_url)?;

        Ok(Self {
            entries,
            fields,
            link_attr: source.link_attr.clone(),
            base_url,
        })
    }

    fn extract_row(&self, row: &ElementRef) -> RawRow {
        let mut raw = RawRow::new();
        for (field, selector) in &self.fields {
            let element = row.select(selector).next();
            let value = if field == FieldSelectors::URL {
                element
                    .and_then(|el| el.value().attr(&self.link_attr))
                    .map(str::trim)
                    .filter(|href| !href.is_empty())
                    .map(|href| resolve_url(&self.base_url, href))
                    .unwrap_or_default()
            } else {
                element.map(|el| el.text().collect()).unwrap_or_default()
            };
            raw.insert(field.as_str(), value);
        }
        raw
    }

    pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

impl RowExtractor for CssSelectors {
    fn rows<'a>(&'a self, document: &'a Html) -> Box<dyn Iterator<Item = RawRow> + 'a> {
        Box::new(
            document
                .select(&self.entries)
                .map(move |row| self.extract_row(&row)),
        )
    }
}

//! Dataset metadata (`eml.xml`) and process metadata (`processinfo.xml`)

use crate::domain::{DataProvider, Result};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const PUB_DATE: &[u8] = b"pubDate";

static PUB_DATE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<pubDate\b[^>]*/>|<pubDate\b[^>]*>.*?</pubDate>")
        .expect("pubDate pattern is valid")
});

/// Remove every `pubDate` element; the remainder is what change detection sees
pub fn strip_pub_date(document: &str) -> String {
    PUB_DATE_ELEMENT.replace_all(document, "").into_owned()
}

/// Minimal EML document for providers without a stored one
pub fn default_eml(provider: &DataProvider, pub_date: NaiveDate) -> String {
    let name = if provider.name.is_empty() {
        provider.identifier.as_str()
    } else {
        provider.name.as_str()
    };
    let name = quick_xml::escape::escape(name);
    let identifier = quick_xml::escape::escape(provider.identifier.as_str());

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="https://eml.ecoinformatics.org/eml-2.2.0" packageId="{identifier}" system="dwca-publisher" xml:lang="en">
  <dataset>
    <title>{name}</title>
    <creator>
      <organizationName>{name}</organizationName>
    </creator>
    <pubDate>{pub_date}</pubDate>
    <language>en</language>
    <abstract>
      <para>Observations published by {name}.</para>
    </abstract>
  </dataset>
</eml:eml>
"#
    )
}

/// Set every `pubDate` element to `pub_date`
///
/// Documents without one get a `pubDate` as the first child of `dataset`.
pub fn rewrite_pub_date(document: &str, pub_date: NaiveDate) -> Result<String> {
    let date = pub_date.format("%Y-%m-%d").to_string();
    let insert = !PUB_DATE_ELEMENT.is_match(document);

    let mut reader = Reader::from_str(document);
    let mut writer = Writer::new(Vec::with_capacity(document.len() + 32));
    let mut inside_pub_date = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == PUB_DATE => {
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Text(BytesText::new(&date)))?;
                inside_pub_date = true;
            }
            Event::End(e) if inside_pub_date && e.local_name().as_ref() == PUB_DATE => {
                inside_pub_date = false;
                writer.write_event(Event::End(e))?;
            }
            _ if inside_pub_date => {}
            Event::Empty(e) if e.local_name().as_ref() == PUB_DATE => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Text(BytesText::new(&date)))?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::Start(e) if insert && e.local_name().as_ref() == b"dataset" => {
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Start(BytesStart::new("pubDate")))?;
                writer.write_event(Event::Text(BytesText::new(&date)))?;
                writer.write_event(Event::End(BytesEnd::new("pubDate")))?;
            }
            event => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| crate::domain::DwcaError::Archive(format!("EML is not UTF-8: {e}")))
}

/// Dataset metadata for a bundle: the stored document or a default, dated today
pub fn render_eml(
    provider: &DataProvider,
    stored: Option<&str>,
    published_at: DateTime<Utc>,
) -> Result<String> {
    let date = published_at.date_naive();
    match stored {
        Some(document) => rewrite_pub_date(document, date),
        None => Ok(default_eml(provider, date)),
    }
}

/// Run metadata written to `processinfo.xml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "processinfo")]
pub struct ProcessInfo {
    #[serde(rename = "@id")]
    pub id: String,

    pub start: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    pub status: String,

    #[serde(rename = "provider", default)]
    pub providers: Vec<ProviderProcessInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProcessInfo {
    #[serde(rename = "@identifier")]
    pub identifier: String,

    #[serde(rename = "@records")]
    pub records: u64,
}

impl ProcessInfo {
    pub fn new(id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end: None,
            status: "Success".to_string(),
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, identifier: impl Into<String>, records: u64) -> Self {
        self.providers.push(ProviderProcessInfo {
            identifier: identifier.into(),
            records,
        });
        self
    }

    pub fn finished(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }
}

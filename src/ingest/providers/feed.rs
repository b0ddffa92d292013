//! Streaming feed parser shared by the RSS and nitter collectors.
//!
//! Handles RSS 2.0 `<item>`, RSS 1.0 / RDF `<item>` (with `dc:date`) and Atom `<entry>`.
//! Elements are matched by local name, so namespace prefixes do not matter.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

/// One raw entry as found in the feed; text is not normalized yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Publication time, falling back to the update time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Summary,
    Published,
    Updated,
}

fn field_for(local: &[u8]) -> Option<Field> {
    match local {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" => Some(Field::Summary),
        b"pubDate" | b"published" | b"date" => Some(Field::Published),
        b"updated" => Some(Field::Updated),
        _ => None,
    }
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom, dc:date) timestamps.
pub fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let numeric;
    let s = match s.strip_suffix(" GMT").or_else(|| s.strip_suffix(" UT")) {
        Some(head) => {
            numeric = format!("{head} +0000");
            numeric.as_str()
        }
        None => s,
    };
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), 0)
}

/// Atom links carry the target in `href`; only `rel="alternate"` (or no rel) counts.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"rel" => rel_ok = attr.value.as_ref() == b"alternate",
            _ => {}
        }
    }
    if rel_ok {
        href
    } else {
        None
    }
}

/// Parse up to `max_entries` entries from the head of the document.
pub fn parse_feed(xml: &str, max_entries: usize) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let mut reader = Reader::from_str(xml);

    let mut out = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let ev = reader
            .read_event()
            .with_context(|| format!("xml error at byte {}", reader.buffer_position()))?;
        match ev {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    current = Some(FeedEntry::default());
                    field = None;
                } else if let Some(entry) = current.as_mut() {
                    if name == b"link" {
                        if let Some(href) = atom_href(&e) {
                            if entry.link.is_empty() {
                                entry.link = href;
                            }
                        }
                    }
                    field = field_for(name);
                    text.clear();
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" && entry.link.is_empty() {
                        if let Some(href) = atom_href(&e) {
                            entry.link = href;
                        }
                    }
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        // HTML entities such as &nbsp; are not XML; keep raw, decoded later
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(c) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    if let Some(entry) = current.take() {
                        out.push(entry);
                        if out.len() >= max_entries {
                            break;
                        }
                    }
                    field = None;
                } else if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    if field_for(name) == Some(f) {
                        let value = text.trim();
                        match f {
                            Field::Title if entry.title.is_empty() => entry.title = value.to_string(),
                            Field::Link if entry.link.is_empty() => entry.link = value.to_string(),
                            Field::Summary if entry.summary.is_empty() => {
                                entry.summary = value.to_string()
                            }
                            Field::Published if entry.published.is_none() => {
                                entry.published = parse_feed_date(value)
                            }
                            Field::Updated if entry.updated.is_none() => {
                                entry.updated = parse_feed_date(value)
                            }
                            _ => {}
                        }
                        field = None;
                        text.clear();
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

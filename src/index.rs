//! CDX-style index parsing.
//!
//! The first non-blank line is a header of single-letter field tags. Tag positions
//! are shifted by one relative to data columns (the header starts with a marker
//! token), so each field lives at `position(tag) - 1`.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TrainerError};
use crate::record::IndexRecord;

pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Mimetypes whose captures are worth training on.
pub const ALLOWED_MIMETYPES: [&str; 3] = ["text/html", "application/json", "text/xml"];

const TAG_ORIGINAL_URL: &str = "a";
const TAG_MIMETYPE: &str = "m";
const TAG_OFFSET: &str = "V";
const TAG_LENGTH: &str = "S";
const TAG_FILE: &str = "g";

/// Data-column positions resolved from an index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub original_url: usize,
    pub mimetype: usize,
    pub offset: usize,
    pub length: usize,
    pub file: usize,
}

impl FieldLayout {
    pub fn from_header(header: &str) -> Result<Self> {
        let tokens: Vec<&str> = header.split_whitespace().collect();
        let column = |tag: &str| -> Result<usize> {
            let pos = tokens
                .iter()
                .position(|t| *t == tag)
                .ok_or_else(|| TrainerError::format(format!("index header has no '{}' field: {:?}", tag, header)))?;
            pos.checked_sub(1)
                .ok_or_else(|| TrainerError::format(format!("index header tag '{}' has no preceding token", tag)))
        };
        Ok(Self {
            original_url: column(TAG_ORIGINAL_URL)?,
            mimetype: column(TAG_MIMETYPE)?,
            offset: column(TAG_OFFSET)?,
            length: column(TAG_LENGTH)?,
            file: column(TAG_FILE)?,
        })
    }

    fn min_columns(&self) -> usize {
        [self.original_url, self.mimetype, self.offset, self.length, self.file]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Outcome of a full index parse.
#[derive(Debug, Default)]
pub struct ParsedIndex {
    pub records: Vec<IndexRecord>,
    pub rows: usize,
    pub filtered: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexParser {
    pub force_redownload: bool,
}

impl IndexParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redownload(force_redownload: bool) -> Self {
        Self { force_redownload }
    }

    /// Parses raw index bytes, transparently un-gzipping them when they carry the gzip magic.
    pub fn parse_bytes(&self, data: &[u8]) -> Result<ParsedIndex> {
        if data.starts_with(&GZIP_MAGIC) {
            self.parse(BufReader::new(GzDecoder::new(data)))
        } else {
            self.parse(Cursor::new(data))
        }
    }

    pub fn parse<R: BufRead>(&self, mut reader: R) -> Result<ParsedIndex> {
        let mut parsed = ParsedIndex::default();
        let mut layout: Option<FieldLayout> = None;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields = match layout {
                Some(l) => l,
                None => {
                    let l = FieldLayout::from_header(line)?;
                    debug!("Index header resolved: {:?}", l);
                    layout = Some(l);
                    continue;
                }
            };

            parsed.rows += 1;
            match self.parse_row(line, &fields) {
                RowOutcome::Record(r) => parsed.records.push(r),
                RowOutcome::Filtered => parsed.filtered += 1,
                RowOutcome::Malformed(reason) => {
                    parsed.malformed += 1;
                    debug!("Skipping malformed index row ({}): {}", reason, line);
                }
            }
        }

        if layout.is_none() {
            return Err(TrainerError::format("index is empty: no header line"));
        }
        if parsed.malformed > 0 {
            warn!("Skipped {} malformed index rows", parsed.malformed);
        }
        info!(
            "Parsed index: {} rows, {} qualifying, {} filtered by mimetype",
            parsed.rows,
            parsed.records.len(),
            parsed.filtered
        );
        Ok(parsed)
    }

    fn parse_row(&self, line: &str, fields: &FieldLayout) -> RowOutcome {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < fields.min_columns() {
            return RowOutcome::Malformed("too few columns");
        }
        if !ALLOWED_MIMETYPES.contains(&cols[fields.mimetype]) {
            return RowOutcome::Filtered;
        }
        let offset = match cols[fields.offset].parse::<u64>() {
            Ok(v) => v,
            Err(_) => return RowOutcome::Malformed("non-numeric offset"),
        };
        let length = match cols[fields.length].parse::<u64>() {
            Ok(v) => v,
            Err(_) => return RowOutcome::Malformed("non-numeric length"),
        };
        RowOutcome::Record(
            IndexRecord::new(cols[fields.original_url], offset, length, cols[fields.file])
                .with_redownload(self.force_redownload),
        )
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<ParsedIndex> {
        let mut data = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut data)?;
        self.parse_bytes(&data)
    }

    /// Downloads an index and parses it.
    pub fn fetch(&self, client: &Client, url: &str) -> Result<ParsedIndex> {
        info!("Fetching index {}", url);
        let resp = client.get(url).send().map_err(|e| TrainerError::network(url, e))?;
        if !resp.status().is_success() {
            return Err(TrainerError::Http { url: url.to_string(), status: resp.status().as_u16() });
        }
        let data = resp.bytes().map_err(|e| TrainerError::network(url, e))?;
        self.parse_bytes(&data)
    }
}

enum RowOutcome {
    Record(IndexRecord),
    Filtered,
    Malformed(&'static str),
}

/// Finds the most recently added CDX index item of a collection and returns its download URL.
pub fn locate_latest_index(client: &Client, archive_host: &str, collection: &str) -> Result<String> {
    let host = archive_host.trim_end_matches('/');
    let search_url = format!("{}/advancedsearch.php", host);
    let query = format!("collection:{} AND format:Item CDX Index", collection);
    let resp = client
        .get(&search_url)
        .query(&[
            ("q", query.as_str()),
            ("fl[]", "identifier"),
            ("sort[]", "addeddate desc"),
            ("rows", "1"),
            ("output", "json"),
        ])
        .send()
        .map_err(|e| TrainerError::network(&search_url, e))?;
    if !resp.status().is_success() {
        return Err(TrainerError::Http { url: search_url, status: resp.status().as_u16() });
    }
    let json: Value = resp.json().map_err(|e| TrainerError::network(&search_url, e))?;
    let identifier = latest_identifier(&json)
        .ok_or_else(|| TrainerError::NotFound(format!("no CDX index item in collection {}", collection)))?;
    Ok(format!("{}/download/{}/{}.cdx.gz", host, identifier, identifier))
}

fn latest_identifier(json: &Value) -> Option<&str> {
    json.get("response")?
        .get("docs")?
        .as_array()?
        .first()?
        .get("identifier")?
        .as_str()
}

//! Turns export response bodies into rows.
//!
//! Each window's body starts with a header line which is discarded; columns are
//! mapped positionally onto the stream's declared field order. Rows from
//! successive windows form one continuous sequence.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};

/// One decoded line: field name to raw string value, in declared field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: &'static [&'static str],
    values: Vec<String>,
}

impl Row {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| *c == field)
            .map(|i| self.values[i].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.columns
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDecoder {
    field_order: &'static [&'static str],
}

impl TableDecoder {
    pub fn new(field_order: &'static [&'static str]) -> Self {
        Self { field_order }
    }

    /// Lazily decode one window's body.
    pub fn rows<'a>(&self, body: &'a [u8]) -> WindowRows<'a> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);
        if let Ok(header) = reader.headers() {
            if !header.is_empty() && header.len() != self.field_order.len() {
                log::warn!(
                    "response header has {} columns, decoding with {} declared fields",
                    header.len(),
                    self.field_order.len()
                );
            }
        }
        WindowRows {
            reader,
            record: csv::StringRecord::new(),
            field_order: self.field_order,
            failed: false,
        }
    }

    /// Decode several windows' bodies, in order, as one row sequence.
    #[cfg(test)]
    pub fn rows_across<'a, I>(&self, bodies: I) -> impl Iterator<Item = Result<Row>> + 'a
    where
        I: IntoIterator<Item = &'a [u8]>,
        I::IntoIter: 'a,
    {
        let decoder = *self;
        bodies.into_iter().flat_map(move |body| decoder.rows(body))
    }
}

/// Rows of a single window. Stops after the first error.
pub struct WindowRows<'a> {
    reader: csv::Reader<&'a [u8]>,
    record: csv::StringRecord,
    field_order: &'static [&'static str],
    failed: bool,
}

impl Iterator for WindowRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                if self.record.len() != self.field_order.len() {
                    self.failed = true;
                    let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                    return Some(Err(Error::Decode {
                        line,
                        expected: self.field_order.len(),
                        found: self.record.len(),
                    }));
                }
                Some(Ok(Row {
                    columns: self.field_order,
                    values: self.record.iter().map(str::to_string).collect(),
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["h1", "h2"];

    fn decode(body: &str) -> Vec<Row> {
        TableDecoder::new(FIELDS)
            .rows(body.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_header_dropped_and_fields_mapped() {
        let rows = decode("h1,h2\nfoo,1\nbar,2\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("h1"), Some("foo"));
        assert_eq!(rows[0].get("h2"), Some("1"));
        assert_eq!(rows[1].get("h1"), Some("bar"));
        assert_eq!(rows[1].get("h2"), Some("2"));
        assert_eq!(rows[0].get("h3"), None);
    }

    #[test]
    fn test_mapping_is_positional_not_header_driven() {
        let rows = decode("Event Name,Event Time\nfoo,1\n");
        assert_eq!(rows[0].get("h1"), Some("foo"));
        assert_eq!(rows[0].get("Event Name"), None);
    }

    #[test]
    fn test_empty_and_header_only_bodies() {
        assert!(decode("").is_empty());
        assert!(decode("h1,h2\n").is_empty());
        assert!(decode("h1,h2").is_empty());
    }

    #[test]
    fn test_quoted_values() {
        let rows = decode("h1,h2\n\"a, b\",\"{\"\"k\"\":1}\"\n");
        assert_eq!(rows[0].get("h1"), Some("a, b"));
        assert_eq!(rows[0].get("h2"), Some("{\"k\":1}"));
    }

    #[test]
    fn test_column_count_mismatch_is_reported() {
        let mut rows = TableDecoder::new(FIELDS).rows(b"h1,h2\nfoo,1\nbar\nbaz,3\n");
        assert!(rows.next().unwrap().is_ok());
        match rows.next().unwrap() {
            Err(Error::Decode {
                line,
                expected,
                found,
            }) => {
                assert_eq!(line, 3);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_windows_concatenate_like_one_table() {
        let decoder = TableDecoder::new(FIELDS);
        let first = b"h1,h2\na,1\nb,2\n".as_slice();
        let second = b"h1,h2\nc,3\n".as_slice();
        let combined = b"h1,h2\na,1\nb,2\nc,3\n".as_slice();

        let chained: Vec<Row> = decoder
            .rows_across([first, second])
            .collect::<Result<_>>()
            .unwrap();
        let single: Vec<Row> = decoder.rows(combined).collect::<Result<_>>().unwrap();
        assert_eq!(chained, single);
        assert_eq!(chained.len(), 3);
    }

    #[test]
    fn test_row_serializes_in_field_order() {
        let rows = decode("x,y\nfoo,1\n");
        let json = serde_json::to_string(&rows[0]).unwrap();
        assert_eq!(json, r#"{"h1":"foo","h2":"1"}"#);
    }
}

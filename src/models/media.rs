//! Media object references and HTTP byte-range descriptors.

use crate::errors::{MediaError, MediaResult};
use serde::Serialize;

/// A resolved reference to a stored media object.
///
/// Resolved lazily: only range requests need the size up front, full reads
/// take it from the read response itself.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaObjectRef {
    /// Bucket the object lives in.
    pub bucket: String,

    /// Object key within the bucket.
    pub key: String,

    /// Total size in bytes.
    pub content_length: u64,

    /// Stored content type, if the store recorded one.
    pub content_type: Option<String>,
}

/// A single `bytes=<start>-[<end>]` range as sent by the client.
///
/// `end` is inclusive; `None` means "through the end of the object".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

/// A range validated against the object size. `end` is inclusive.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

/// Whether a relay response carries the whole object or a slice of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeStatus {
    Full,
    Partial,
}

impl RangeRequest {
    /// Parse a raw `Range` header value.
    ///
    /// Only one `bytes=` range with an explicit start is accepted. Multi-range
    /// and suffix (`bytes=-N`) forms are rejected rather than ignored.
    pub fn parse(header: &str) -> MediaResult<Self> {
        let bounds = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| MediaError::MalformedRange(format!("unsupported unit in `{}`", header)))?;

        if bounds.contains(',') {
            return Err(MediaError::MalformedRange(
                "multiple ranges are not supported".into(),
            ));
        }

        let (start, end) = bounds
            .split_once('-')
            .ok_or_else(|| MediaError::MalformedRange(format!("missing `-` in `{}`", header)))?;

        let start = parse_offset(start.trim())
            .ok_or_else(|| MediaError::MalformedRange(format!("invalid start in `{}`", header)))?;

        let end = match end.trim() {
            "" => None,
            raw => Some(
                parse_offset(raw).ok_or_else(|| {
                    MediaError::MalformedRange(format!("invalid end in `{}`", header))
                })?,
            ),
        };

        Ok(Self { start, end })
    }

    /// Validate against the object size, clamping an overlong end.
    pub fn resolve(&self, total: u64) -> MediaResult<ResolvedRange> {
        if self.start >= total {
            return Err(MediaError::RangeNotSatisfiable { total_size: total });
        }

        let last = total - 1;
        let end = self.end.map_or(last, |end| end.min(last));
        if end < self.start {
            return Err(MediaError::MalformedRange(format!(
                "end {} precedes start {}",
                end, self.start
            )));
        }

        Ok(ResolvedRange {
            start: self.start,
            end,
            total,
        })
    }
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Digits only: rejects signs, whitespace inside the number and empty input.
fn parse_offset(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(header: &str) -> bool {
        matches!(RangeRequest::parse(header), Err(MediaError::MalformedRange(_)))
    }

    #[test]
    fn parses_open_and_closed_ranges() {
        assert_eq!(
            RangeRequest::parse("bytes=500-").unwrap(),
            RangeRequest { start: 500, end: None }
        );
        assert_eq!(
            RangeRequest::parse("bytes=0-0").unwrap(),
            RangeRequest { start: 0, end: Some(0) }
        );
        assert_eq!(
            RangeRequest::parse(" bytes=10-20 ").unwrap(),
            RangeRequest { start: 10, end: Some(20) }
        );
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(malformed("bytes=0-10,20-30"));
        assert!(malformed("bytes=-500"));
        assert!(malformed("bytes=abc-"));
        assert!(malformed("bytes=+5-"));
        assert!(malformed("bytes=5-x"));
        assert!(malformed("items=0-10"));
        assert!(malformed("bytes=100"));
        assert!(malformed(""));
    }

    #[test]
    fn open_range_runs_to_last_byte() {
        for start in [0, 1, 500, 999] {
            let range = RangeRequest { start, end: None }.resolve(1000).unwrap();
            assert_eq!(range.end, 999);
            assert_eq!(range.content_range(), format!("bytes {}-999/1000", start));
        }
    }

    #[test]
    fn start_past_end_is_not_satisfiable() {
        for start in [1000, 1001, u64::MAX] {
            let err = RangeRequest { start, end: None }.resolve(1000).unwrap_err();
            assert!(matches!(err, MediaError::RangeNotSatisfiable { total_size: 1000 }));
        }
        // precedence: an unsatisfiable start wins over an inverted end
        let err = RangeRequest { start: 2000, end: Some(10) }.resolve(1000).unwrap_err();
        assert!(matches!(err, MediaError::RangeNotSatisfiable { .. }));
    }

    #[test]
    fn empty_object_satisfies_no_range() {
        let err = RangeRequest { start: 0, end: None }.resolve(0).unwrap_err();
        assert!(matches!(err, MediaError::RangeNotSatisfiable { total_size: 0 }));
    }

    #[test]
    fn end_is_clamped_and_inverted_ranges_rejected() {
        let range = RangeRequest { start: 900, end: Some(5000) }.resolve(1000).unwrap();
        assert_eq!((range.start, range.end, range.len()), (900, 999, 100));

        let err = RangeRequest { start: 5, end: Some(2) }.resolve(1000).unwrap_err();
        assert!(matches!(err, MediaError::MalformedRange(_)));
    }

    #[test]
    fn single_byte_range() {
        let range = RangeRequest::parse("bytes=0-0").unwrap().resolve(1000).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.content_range(), "bytes 0-0/1000");
    }
}

//! RFC 7233 single-range parsing for media requests.

/// Outcome of parsing a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Serve `[start, end]` inclusive with 206
    Partial { start: u64, end: u64 },
    /// 416 with `Content-Range: bytes */size`
    Unsatisfiable,
    /// Header malformed or not a byte range: ignore it and serve the full file
    Ignore,
}

/// Parse a `Range` header value for a file of `size` bytes.
///
/// Handles the single-range forms `bytes=a-b`, `bytes=a-`, `bytes=-n` and
/// clamps last-byte positions past EOF. Multi-range requests are ignored
/// and served whole.
pub fn parse_range(header: &str, size: u64) -> RangeOutcome {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::Ignore;
    };
    if spec.contains(',') {
        return RangeOutcome::Ignore;
    }
    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return RangeOutcome::Ignore;
    };
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    if size == 0 {
        return RangeOutcome::Unsatisfiable;
    }

    if start_raw.is_empty() {
        // Suffix form: last n bytes, clamped to the whole file.
        let Ok(suffix) = end_raw.parse::<u64>() else {
            return RangeOutcome::Ignore;
        };
        if suffix == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let len = suffix.min(size);
        return RangeOutcome::Partial {
            start: size - len,
            end: size - 1,
        };
    }

    let Ok(start) = start_raw.parse::<u64>() else {
        return RangeOutcome::Ignore;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }

    let end = if end_raw.is_empty() {
        size - 1
    } else {
        let Ok(end) = end_raw.parse::<u64>() else {
            return RangeOutcome::Ignore;
        };
        if end < start {
            return RangeOutcome::Ignore;
        }
        end.min(size - 1)
    };

    RangeOutcome::Partial { start, end }
}

/// `Content-Range` value for a partial response.
pub fn content_range(start: u64, end: u64, size: u64) -> String {
    format!("bytes {}-{}/{}", start, end, size)
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_range(size: u64) -> String {
    format!("bytes */{}", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_range() {
        assert_eq!(
            parse_range("bytes=0-499", 1000),
            RangeOutcome::Partial { start: 0, end: 499 }
        );
        assert_eq!(
            parse_range("bytes=500-999", 1000),
            RangeOutcome::Partial { start: 500, end: 999 }
        );
    }

    #[test]
    fn open_ended_range_covers_the_rest() {
        assert_eq!(
            parse_range("bytes=0-", 1000),
            RangeOutcome::Partial { start: 0, end: 999 }
        );
        assert_eq!(
            parse_range("bytes=900-", 1000),
            RangeOutcome::Partial { start: 900, end: 999 }
        );
    }

    #[test]
    fn suffix_range_takes_the_tail() {
        assert_eq!(
            parse_range("bytes=-100", 1000),
            RangeOutcome::Partial { start: 900, end: 999 }
        );
    }

    #[test]
    fn suffix_larger_than_file_is_clamped_to_whole() {
        // bytes=-500 on a 200-byte file returns the full file with 206
        assert_eq!(
            parse_range("bytes=-500", 200),
            RangeOutcome::Partial { start: 0, end: 199 }
        );
    }

    #[test]
    fn last_byte_past_eof_is_clamped() {
        assert_eq!(
            parse_range("bytes=0-99999", 1000),
            RangeOutcome::Partial { start: 0, end: 999 }
        );
    }

    #[test]
    fn start_past_eof_is_unsatisfiable() {
        assert_eq!(parse_range("bytes=1000-", 1000), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("bytes=5000-6000", 1000), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn zero_suffix_is_unsatisfiable() {
        assert_eq!(parse_range("bytes=-0", 1000), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn malformed_headers_are_ignored() {
        assert_eq!(parse_range("chunks=0-1", 1000), RangeOutcome::Ignore);
        assert_eq!(parse_range("bytes=abc-def", 1000), RangeOutcome::Ignore);
        assert_eq!(parse_range("bytes=", 1000), RangeOutcome::Ignore);
        assert_eq!(parse_range("bytes=10-5", 1000), RangeOutcome::Ignore);
        assert_eq!(parse_range("bytes=0-100,200-300", 1000), RangeOutcome::Ignore);
    }

    #[test]
    fn content_length_matches_the_contract() {
        // For bytes=a-b: Content-Length = b - a + 1
        if let RangeOutcome::Partial { start, end } = parse_range("bytes=10-19", 100) {
            assert_eq!(end - start + 1, 10);
            assert_eq!(content_range(start, end, 100), "bytes 10-19/100");
        } else {
            panic!("expected partial");
        }
        assert_eq!(unsatisfiable_range(100), "bytes */100");
    }
}

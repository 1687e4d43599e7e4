use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use sanitize_filename::sanitize;

use crate::core::model::{CategoryStats, OptimizationStats, DEFAULT_RESULT_NAME};

pub const H_ORIGINAL_SIZE: &str = "x-original-size";
pub const H_OPTIMIZED_SIZE: &str = "x-optimized-size";
pub const H_COMPRESSION_RATIO: &str = "x-compression-ratio";
pub const H_TOTAL_FILES: &str = "x-total-files";
pub const H_OPTIMIZED_FILES: &str = "x-optimized-files";
pub const H_BYTES_SAVED: &str = "x-bytes-saved";
pub const H_ACTUAL_BYTES_SAVED: &str = "x-actual-bytes-saved";
pub const H_FILE_TYPES: &str = "x-file-types";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    header_str(headers, name)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

fn header_f64(headers: &HeaderMap, name: &str) -> f64 {
    header_str(headers, name)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Build statistics out of the service's response headers. Missing or
/// unparsable fields default to zero; a bad `X-File-Types` value degrades to
/// an empty mapping. The binary payload is usable either way, so this never
/// fails.
pub fn stats_from_headers(headers: &HeaderMap) -> OptimizationStats {
    let file_types: BTreeMap<String, CategoryStats> = header_str(headers, H_FILE_TYPES)
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    OptimizationStats {
        original_size: header_u64(headers, H_ORIGINAL_SIZE),
        optimized_size: header_u64(headers, H_OPTIMIZED_SIZE),
        compression_ratio: header_f64(headers, H_COMPRESSION_RATIO),
        total_files: header_u64(headers, H_TOTAL_FILES),
        optimized_files: header_u64(headers, H_OPTIMIZED_FILES),
        bytes_saved: header_u64(headers, H_BYTES_SAVED),
        actual_bytes_saved: header_u64(headers, H_ACTUAL_BYTES_SAVED),
        file_types,
    }
}

/// Pull the suggested filename out of a disposition-style header, tolerating
/// quoted and unquoted values. Falls back to [`DEFAULT_RESULT_NAME`] on any
/// shape it does not recognize.
pub fn filename_from_headers(headers: &HeaderMap) -> String {
    let raw = match headers.get(CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()) {
        Some(v) => v,
        None => return DEFAULT_RESULT_NAME.to_string(),
    };

    let name = raw
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("filename") {
                Some(value.trim().trim_matches('"').trim_matches('\'').to_string())
            } else {
                None
            }
        })
        .find(|v| !v.is_empty());

    match name {
        Some(n) => {
            let clean = sanitize(&n);
            if clean.is_empty() { DEFAULT_RESULT_NAME.to_string() } else { clean }
        }
        None => DEFAULT_RESULT_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(
                reqwest::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        h
    }

    #[test]
    fn stats_round_trip_well_formed() {
        let h = headers(&[
            (H_ORIGINAL_SIZE, "10485760"),
            (H_OPTIMIZED_SIZE, "6501171"),
            (H_COMPRESSION_RATIO, "37.5"),
            (H_TOTAL_FILES, "50"),
            (H_OPTIMIZED_FILES, "42"),
            (H_BYTES_SAVED, "3984589"),
            (H_ACTUAL_BYTES_SAVED, "3984000"),
            (
                H_FILE_TYPES,
                r#"{"png":{"count":30,"optimized":28,"saved":3000000},"json":{"count":12,"optimized":10,"saved":900000},"ogg":{"count":4,"optimized":4,"saved":84589},"other":{"count":4}}"#,
            ),
        ]);
        let s = stats_from_headers(&h);
        assert_eq!(s.original_size, 10_485_760);
        assert_eq!(s.optimized_size, 6_501_171);
        assert_eq!(s.compression_ratio, 37.5);
        assert_eq!(s.total_files, 50);
        assert_eq!(s.optimized_files, 42);
        assert_eq!(s.bytes_saved, 3_984_589);
        assert_eq!(s.actual_bytes_saved, 3_984_000);
        assert!(s.optimized_files <= s.total_files);
        // Category counts sum back to the file total.
        let sum: u64 = s.file_types.values().map(|c| c.count).sum();
        assert_eq!(sum, s.total_files);
        assert_eq!(s.file_types["png"].optimized, 28);
        // `other` carries only a count.
        assert_eq!(s.file_types["other"].optimized, 0);
        assert_eq!(s.file_types["other"].saved, 0);
    }

    #[test]
    fn stats_default_on_missing_or_garbage() {
        let h = headers(&[
            (H_ORIGINAL_SIZE, "not-a-number"),
            (H_COMPRESSION_RATIO, ""),
            (H_FILE_TYPES, "{broken json"),
        ]);
        let s = stats_from_headers(&h);
        assert_eq!(s.original_size, 0);
        assert_eq!(s.compression_ratio, 0.0);
        assert_eq!(s.total_files, 0);
        assert!(s.file_types.is_empty());

        let empty = stats_from_headers(&HeaderMap::new());
        assert_eq!(empty, OptimizationStats::default());
    }

    #[test]
    fn filename_quoted_and_unquoted() {
        let h = headers(&[("content-disposition", r#"attachment; filename="my pack.zip""#)]);
        assert_eq!(filename_from_headers(&h), "my pack.zip");

        let h = headers(&[("content-disposition", "attachment; filename=pack_opt.zip")]);
        assert_eq!(filename_from_headers(&h), "pack_opt.zip");

        let h = headers(&[("content-disposition", "attachment; FILENAME=upper.zip")]);
        assert_eq!(filename_from_headers(&h), "upper.zip");
    }

    #[test]
    fn filename_falls_back_on_absent_or_malformed() {
        assert_eq!(filename_from_headers(&HeaderMap::new()), DEFAULT_RESULT_NAME);

        let h = headers(&[("content-disposition", "attachment")]);
        assert_eq!(filename_from_headers(&h), DEFAULT_RESULT_NAME);

        let h = headers(&[("content-disposition", "attachment; filename=")]);
        assert_eq!(filename_from_headers(&h), DEFAULT_RESULT_NAME);
    }

    #[test]
    fn filename_is_sanitized() {
        let h = headers(&[("content-disposition", r#"attachment; filename="../../evil.zip""#)]);
        let name = filename_from_headers(&h);
        // No path separators survive, so the name cannot escape the out dir.
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(name.ends_with("evil.zip"));
    }
}

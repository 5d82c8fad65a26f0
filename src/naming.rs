//! Filename grammar used by the takeout export
//!
//! Google names a media file's JSON sidecar after the media file, appends
//! `.supplemental-metadata`, moves the `(N)` duplicate marker around and cuts
//! the result to 46 characters. Depending on the export, that count is in
//! grapheme clusters or in UTF-16 code units, so both cuts are tried.

use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Longest sidecar name (without `.json`) the export produces
pub const MAX_SIDECAR_STEM_LEN: usize = 46;

/// Marker Google inserts into newer sidecar names
pub const SUPPLEMENTAL_SUFFIX: &str = ".supplemental-metadata";

/// Longest file name most filesystems accept, in bytes
const MAX_FILE_NAME_BYTES: usize = 255;

static FILE_NAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static DUPLICATE_MARKER: OnceLock<Regex> = OnceLock::new();

fn file_name_pattern() -> &'static Regex {
    FILE_NAME_PATTERN.get_or_init(|| Regex::new(r"^(.+?)(\(\d+\))?\.([^.]+)$").unwrap())
}

fn duplicate_marker() -> &'static Regex {
    DUPLICATE_MARKER.get_or_init(|| Regex::new(r"\(\d+\)$").unwrap())
}

/// Components of a media file name such as `IMG_0012(1).HEIC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameParts {
    /// Name without duplicate marker and extension (`IMG_0012`)
    pub base: String,
    /// Duplicate marker including parentheses (`(1)`), or empty
    pub duplicate: String,
    /// Extension without the dot (`HEIC`), or empty
    pub extension: String,
}

/// Parse `(base)(duplicate)?.(extension)`
///
/// Names without an extension separator, and hidden files like `.gitignore`,
/// come back whole as the base.
pub fn parse_file_name(file_name: &str) -> FileNameParts {
    match file_name_pattern().captures(file_name) {
        Some(caps) => FileNameParts {
            base: caps.get(1).map_or("", |m| m.as_str()).to_string(),
            duplicate: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            extension: caps.get(3).map_or("", |m| m.as_str()).to_string(),
        },
        None => FileNameParts {
            base: file_name.to_string(),
            duplicate: String::new(),
            extension: String::new(),
        },
    }
}

/// Split at the last dot; a leading dot does not start an extension
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        None | Some(0) => (file_name, None),
        Some(i) => (&file_name[..i], Some(&file_name[i + 1..])),
    }
}

/// Check if a file name is a JSON metadata file
pub fn is_metadata_file(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".json")
}

/// Cut a string to at most `max` UTF-16 code units without splitting a char
pub fn truncate_utf16(s: &str, max: usize) -> &str {
    let mut units = 0;
    for (idx, ch) in s.char_indices() {
        units += ch.len_utf16();
        if units > max {
            return &s[..idx];
        }
    }
    s
}

/// Cut a string to at most `max` extended grapheme clusters
pub fn truncate_graphemes(s: &str, max: usize) -> &str {
    match s.grapheme_indices(true).nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sidecar names Google may have produced for a media file, most likely first
///
/// The list is deterministic for a given name and free of duplicates.
pub fn sidecar_candidates(file_name: &str) -> Vec<String> {
    let (stem, extension) = split_extension(file_name);
    let extension = extension.map(|e| format!(".{e}")).unwrap_or_default();

    let (name, duplicate) = match duplicate_marker().find(stem) {
        Some(m) => (&stem[..m.start()], m.as_str()),
        None => (stem, ""),
    };

    let marker_after = format!("{name}{extension}{SUPPLEMENTAL_SUFFIX}");
    let marker_before = format!("{name}{duplicate}{extension}{SUPPLEMENTAL_SUFFIX}");
    let plain = format!("{name}{extension}");

    let candidates = [
        format!("{marker_after}{duplicate}.json"),
        format!("{marker_before}.json"),
        format!("{}{duplicate}.json", truncate_utf16(&marker_after, MAX_SIDECAR_STEM_LEN)),
        format!("{}{duplicate}.json", truncate_graphemes(&marker_after, MAX_SIDECAR_STEM_LEN)),
        format!("{}.json", truncate_utf16(&marker_before, MAX_SIDECAR_STEM_LEN)),
        format!("{}.json", truncate_graphemes(&marker_before, MAX_SIDECAR_STEM_LEN)),
        format!("{}{duplicate}.json", truncate_utf16(&plain, MAX_SIDECAR_STEM_LEN)),
    ];

    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.len() <= MAX_FILE_NAME_BYTES && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// Sidecar name the export writes next to `file_name`
///
/// Uses UTF-16 unit slicing, which is what the importer expects, not
/// Google's grapheme slicing.
pub fn output_sidecar_name(file_name: &str) -> String {
    let stem = format!("{file_name}{SUPPLEMENTAL_SUFFIX}");
    format!("{}.json", truncate_utf16(&stem, MAX_SIDECAR_STEM_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name_with_duplicate() {
        let parts = parse_file_name("IMG_0012(1).HEIC");
        assert_eq!(parts.base, "IMG_0012");
        assert_eq!(parts.duplicate, "(1)");
        assert_eq!(parts.extension, "HEIC");
    }

    #[test]
    fn test_parse_file_name_without_extension() {
        let parts = parse_file_name(".gitignore");
        assert_eq!(parts.base, ".gitignore");
        assert_eq!(parts.duplicate, "");
        assert_eq!(parts.extension, "");

        let parts = parse_file_name("README");
        assert_eq!(parts.base, "README");
        assert_eq!(parts.extension, "");
    }

    #[test]
    fn test_parse_file_name_multiple_dots() {
        let parts = parse_file_name("archive.tar.gz");
        assert_eq!(parts.base, "archive.tar");
        assert_eq!(parts.extension, "gz");

        let parts = parse_file_name("IMG(1)(2).jpg");
        assert_eq!(parts.base, "IMG(1)");
        assert_eq!(parts.duplicate, "(2)");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("photo.jpg"), ("photo", Some("jpg")));
        assert_eq!(split_extension("photo"), ("photo", None));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
        assert_eq!(split_extension("a.b.c"), ("a.b", Some("c")));
    }

    #[test]
    fn test_is_metadata_file() {
        assert!(is_metadata_file("IMG.jpg.json"));
        assert!(is_metadata_file("Metadata.JSON"));
        assert!(!is_metadata_file("IMG.jpg"));
        assert!(!is_metadata_file("json"));
    }

    #[test]
    fn test_candidates_first_is_untruncated_marker_after() {
        let candidates = sidecar_candidates("IMG_20200101_120000(1).jpg");
        assert_eq!(
            candidates[0],
            "IMG_20200101_120000.jpg.supplemental-metadata(1).json"
        );
        assert!(candidates.contains(&"IMG_20200101_120000(1).jpg.supplemental-metadata.json".to_string()));
        assert!(candidates.contains(&"IMG_20200101_120000(1).jpg.supplemental-metada.json".to_string()));
        assert!(candidates.contains(&"IMG_20200101_120000.jpg(1).json".to_string()));
        assert!(candidates.len() <= 7);
    }

    #[test]
    fn test_candidates_are_deterministic_and_unique() {
        let a = sidecar_candidates("PXL_20230514_093012345.MP.jpg");
        let b = sidecar_candidates("PXL_20230514_093012345.MP.jpg");
        assert_eq!(a, b);

        let mut deduped = a.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), a.len());
        for candidate in &a {
            assert_eq!(a.iter().filter(|c| *c == candidate).count(), 1);
        }
    }

    #[test]
    fn test_candidates_short_name() {
        let candidates = sidecar_candidates("IMG_1.jpg");
        assert_eq!(
            candidates,
            vec![
                "IMG_1.jpg.supplemental-metadata.json".to_string(),
                "IMG_1.jpg.json".to_string(),
            ]
        );
    }

    #[test]
    fn test_candidates_long_name_truncates_to_46() {
        let name = "Screenshot_20201224-181512_Some Long App Name.png";
        let candidates = sidecar_candidates(name);
        assert_eq!(
            candidates,
            vec![
                "Screenshot_20201224-181512_Some Long App Name.png.supplemental-metadata.json"
                    .to_string(),
                "Screenshot_20201224-181512_Some Long App Name..json".to_string(),
            ]
        );
        assert_eq!(candidates[1].len() - ".json".len(), 46);
    }

    #[test]
    fn test_grapheme_and_unit_truncation_differ() {
        // "u" + combining diaeresis: two code units, one grapheme
        let umlaut = "u\u{0308}";
        let name = format!("{}{}.jpg", umlaut.repeat(10), "x".repeat(20));
        let candidates = sidecar_candidates(&name);

        let marker_after = format!("{}{}.jpg{}", umlaut.repeat(10), "x".repeat(20), SUPPLEMENTAL_SUFFIX);
        let by_units = format!("{}.json", truncate_utf16(&marker_after, 46));
        let by_graphemes = format!("{}.json", truncate_graphemes(&marker_after, 46));

        assert_ne!(by_units, by_graphemes);
        assert!(candidates.contains(&by_units));
        assert!(candidates.contains(&by_graphemes));
    }

    #[test]
    fn test_truncate_utf16_keeps_surrogate_pairs_whole() {
        // Each emoji is two UTF-16 units
        let s = "\u{1F600}\u{1F600}\u{1F600}";
        assert_eq!(truncate_utf16(s, 3), "\u{1F600}");
        assert_eq!(truncate_utf16(s, 4), "\u{1F600}\u{1F600}");
        assert_eq!(truncate_utf16("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_graphemes() {
        let s = "a\u{0308}b\u{0308}c";
        assert_eq!(truncate_graphemes(s, 2), "a\u{0308}b\u{0308}");
        assert_eq!(truncate_graphemes(s, 10), s);
    }

    #[test]
    fn test_output_sidecar_name_uses_unit_slicing() {
        assert_eq!(
            output_sidecar_name("IMG_1.jpg"),
            "IMG_1.jpg.supplemental-metadata.json"
        );
        assert_eq!(
            output_sidecar_name("IMG_20200101_120000_1.jpg"),
            "IMG_20200101_120000_1.jpg.supplemental-metadat.json"
        );

        let umlaut = "u\u{0308}";
        let file = format!("{}.jpg", umlaut.repeat(20));
        let expected_stem = truncate_utf16(&format!("{file}{SUPPLEMENTAL_SUFFIX}"), 46).to_string();
        assert_eq!(output_sidecar_name(&file), format!("{expected_stem}.json"));
        assert_ne!(
            output_sidecar_name(&file),
            format!("{}.json", truncate_graphemes(&format!("{file}{SUPPLEMENTAL_SUFFIX}"), 46))
        );
    }
}

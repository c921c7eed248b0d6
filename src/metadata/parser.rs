/// Utility functions for parsing multi-value metadata fields

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Get the regex pattern for splitting multi-value fields
fn get_separator_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        // Match any of: comma, semicolon, slash, pipe, ideographic comma, ampersand,
        // "ft.", "feat.", "featuring" (case-insensitive)
        Regex::new(r#"(?i)[,;/|、&]|\s+(?:ft\.?|feat\.?|featuring)\s+"#).unwrap()
    })
}

/// Split every raw tag value into individual names.
///
/// Splits on: `, ; / | 、 & ft. feat. featuring`. Names are trimmed and repeated
/// names (compared case-insensitively) keep their first spelling and position.
///
/// # Examples
/// ```
/// use cadenza::metadata::parser::parse_multi_value;
///
/// let artists = parse_multi_value(["Artist A, Artist B & artist a"]);
/// assert_eq!(artists, vec!["Artist A", "Artist B"]);
/// ```
pub fn parse_multi_value<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let regex = get_separator_regex();
    let mut seen = HashSet::new();

    values
        .into_iter()
        .flat_map(|value| regex.split(value))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Parse artist frames, returning individual artists in credit order
pub fn parse_artists<'a>(artist: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    parse_multi_value(artist)
}

/// Parse genre frames, returning individual genres
pub fn parse_genres<'a>(genre: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    parse_multi_value(genre)
}

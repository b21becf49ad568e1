use lazy_static::lazy_static;
use regex::Regex;
use unidecode::unidecode;

lazy_static! {
    static ref NON_ALNUM_RE: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Derives a URL slug from a deck name: ascii-folded, lowercased, runs of
/// anything else squeezed to single dashes.
pub fn slugify(name: &str) -> String {
    let folded = unidecode(name).to_lowercase();
    NON_ALNUM_RE
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

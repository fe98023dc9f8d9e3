//! Title normalization
//!
//! Pure transform applied to every title before comparison: ASCII
//! lowercase, punctuation stripped, leading/trailing articles removed,
//! leading medium prefixes removed, whitespace collapsed. Idempotent by
//! construction; non-ASCII scripts pass through untouched apart from the
//! punctuation and whitespace rules.

/// Articles dropped from the front and back of a title
const ARTICLES: &[&str] = &["the", "a", "an"];

/// Leading tokens that name the work's medium rather than its identity
const MEDIUM_PREFIXES: &[&str] = &["manga", "manhwa", "manhua", "webtoon", "novel", "comic"];

/// Normalize a title for comparison.
///
/// `normalize(normalize(x)) == normalize(x)` for all inputs.
pub fn normalize(title: &str) -> String {
    // Case fold ASCII only; other scripts keep their form
    let lowered: String = title
        .chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect();

    // Strip punctuation, keep alphanumerics (any script) and whitespace
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = stripped.split_whitespace().collect();

    // Leading articles and medium prefixes describe format, not identity
    while let Some(first) = tokens.first() {
        if ARTICLES.contains(first) || MEDIUM_PREFIXES.contains(first) {
            // A title that is nothing but articles keeps its last token so
            // normalization never maps a nonempty title to the empty string.
            if tokens.len() == 1 {
                break;
            }
            tokens.remove(0);
        } else {
            break;
        }
    }

    // Trailing articles ("Promised Neverland, The")
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        if ARTICLES.contains(&last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

/// Proportion of shared whitespace-delimited tokens between two normalized
/// titles, measured against the smaller token set so a title that is a
/// subset of the other scores 1.0. Returns 0.0 when either side is empty.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let shared = set_a.intersection(&set_b).count();
    let smaller = set_a.len().min(set_b.len());
    shared as f64 / smaller as f64
}

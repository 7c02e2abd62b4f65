//! Tag extraction and set similarity.

use std::collections::BTreeSet;

/// Words that never become tags
const STOPWORDS: &[&str] = &[
    "and", "the", "for", "with", "that", "this", "from", "into", "using", "use", "build",
    "create", "make", "simple", "basic", "some", "app", "your", "have", "has", "are", "can",
];

/// Lowercased keyword tags from free text.
///
/// Splits on anything that is not alphanumeric and keeps words of three or
/// more characters that are not stopwords.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard similarity of two tag sets. Two empty sets are not similar.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Fraction of the query tags present in `tags`.
pub fn overlap_ratio(query: &BTreeSet<String>, tags: &BTreeSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(tags).count() as f64 / query.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_tags() {
        let tags = extract_tags("Create a sortable, filterable data-table with React");
        assert_eq!(tags, set(&["data", "filterable", "react", "sortable", "table"]));
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["a", "b"])), 1.0);
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_overlap_ratio() {
        let q = set(&["form", "validation"]);
        assert_eq!(overlap_ratio(&q, &set(&["form", "button"])), 0.5);
        assert_eq!(overlap_ratio(&set(&[]), &set(&["form"])), 0.0);
    }
}

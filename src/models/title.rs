//! Helpers for catalog titles in the "Name, The (1999)" convention.

use regex::Regex;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{4})\)").expect("valid year regex"));

static TRAILING_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d{4}\)\s*$").expect("valid trailing year regex"));

static TRAILING_ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+),\s*(the|a|an)$").expect("valid trailing article regex")
});

/// Removes the year suffix and outer quotes, and moves a trailing article to the front
///
/// `"Matrix, The (1999)"` becomes `"The Matrix"`.
pub fn clean_title(title: &str) -> String {
    let without_year = TRAILING_YEAR_RE.replace(title, "");
    let trimmed = without_year.trim().trim_matches('"').trim();

    match TRAILING_ARTICLE_RE.captures(trimmed) {
        Some(caps) => format!("{} {}", &caps[2], caps[1].trim()),
        None => trimmed.to_string(),
    }
}

/// Last parenthesized 4-digit year in the title, if any
pub fn extract_year(title: &str) -> Option<i32> {
    YEAR_RE
        .captures_iter(title)
        .last()
        .and_then(|caps| caps[1].parse().ok())
}

/// Case- and whitespace-insensitive key for a title
pub fn title_signature(title: &str) -> String {
    clean_title(title)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed, non-empty tokens of a pipe-delimited genre field
pub fn genre_tokens(field: &str) -> impl Iterator<Item = &str> {
    field.split('|').map(str::trim).filter(|g| !g.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_moves_article() {
        assert_eq!(clean_title("Matrix, The (1999)"), "The Matrix");
        assert_eq!(clean_title("Beautiful Mind, A (2001)"), "A Beautiful Mind");
        assert_eq!(clean_title("American Tail, An (1986)"), "An American Tail");
    }

    #[test]
    fn test_clean_title_plain() {
        assert_eq!(clean_title("Toy Story (1995)"), "Toy Story");
        assert_eq!(clean_title("\"Cats\" (1998)"), "Cats");
        assert_eq!(clean_title("Heat"), "Heat");
    }

    #[test]
    fn test_clean_title_keeps_inner_commas() {
        assert_eq!(
            clean_title("Good, the Bad and the Ugly, The (1966)"),
            "The Good, the Bad and the Ugly"
        );
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("Matrix, The (1999)"), Some(1999));
        assert_eq!(extract_year("Blade Runner (1982) (Final Cut)"), Some(1982));
        assert_eq!(extract_year("Heat"), None);
        assert_eq!(extract_year("2001: A Space Odyssey"), None);
    }

    #[test]
    fn test_title_signature_normalizes() {
        assert_eq!(title_signature("Matrix,  The (1999)"), "the matrix");
        assert_eq!(title_signature("  THE   MATRIX "), "the matrix");
    }

    #[test]
    fn test_genre_tokens() {
        let tokens: Vec<&str> = genre_tokens(" Action | Sci-Fi||Thriller ").collect();
        assert_eq!(tokens, vec!["Action", "Sci-Fi", "Thriller"]);
    }
}

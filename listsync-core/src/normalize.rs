//! Title normalization and list-name parsing.

/// Lowercase `text` and collapse every run of whitespace into a single space.
///
/// Two titles are considered the same item when their normalized forms are equal.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive comparison of trimmed titles, used to find lists by name.
pub fn titles_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Split a comma separated list of names, trimming each and dropping blanks.
pub fn parse_list_names(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Oat   MILK\t"), "oat milk");
        assert_eq!(normalize("Eggs\n\nand  Ham"), "eggs and ham");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_handles_non_ascii() {
        assert_eq!(normalize("CRÈME  Fraîche"), "crème fraîche");
    }

    #[test]
    fn titles_match_ignores_case_and_outer_whitespace() {
        assert!(titles_match(" Groceries ", "groceries"));
        assert!(!titles_match("Groceries", "Grocery"));
    }

    #[test]
    fn parse_list_names_drops_blanks_and_keeps_order() {
        assert_eq!(
            parse_list_names(Some(" Groceries, ,Hardware ,,Pharmacy")),
            vec!["Groceries", "Hardware", "Pharmacy"]
        );
        assert!(parse_list_names(Some("")).is_empty());
        assert!(parse_list_names(Some(" , ")).is_empty());
        assert!(parse_list_names(None).is_empty());
    }
}

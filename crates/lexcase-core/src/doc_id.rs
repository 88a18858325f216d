//! Stable document identifiers for corpus records that carry none.
//!
//! Identifiers key feedback entries across sessions, so they must depend only
//! on the record's title and year, never on its position in the corpus file.

/// Derive an identifier from a title and year.
///
/// Input: `"K.S. Puttaswamy v. Union of India"`, `2017`
/// Output: `"k-s-puttaswamy-v-union-of-india-2017"`
///
/// ASCII alphanumerics are lower-cased and kept; every other run of
/// characters collapses into a single `-`.
pub fn document_id(title: &str, year: i32) -> String {
    let mut slug = String::with_capacity(title.len() + 5);
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        format!("doc-{year}")
    } else {
        format!("{slug}-{year}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values() {
        assert_eq!(
            document_id("K.S. Puttaswamy v. Union of India", 2017),
            "k-s-puttaswamy-v-union-of-india-2017"
        );
        assert_eq!(
            document_id("Anuradha Bhasin v. Union of India", 2020),
            "anuradha-bhasin-v-union-of-india-2020"
        );
    }

    #[test]
    fn punctuation_runs_collapse() {
        assert_eq!(document_id("  A -- B ** C  ", 1999), "a-b-c-1999");
    }

    #[test]
    fn empty_title_falls_back_to_year() {
        assert_eq!(document_id("", 2001), "doc-2001");
        assert_eq!(document_id("§§", 2001), "doc-2001");
    }

    #[test]
    fn same_input_same_id() {
        assert_eq!(document_id("Shreya Singhal", 2015), document_id("Shreya Singhal", 2015));
        assert_ne!(document_id("Shreya Singhal", 2015), document_id("Shreya Singhal", 2016));
    }
}

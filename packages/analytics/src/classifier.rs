//! Address-to-sector classification.
//!
//! A sector is a town or village name. An address belongs to the sector
//! whose name occurs in it earliest; when two names start at the same
//! position the one listed first wins. Matching is a plain substring test
//! on the upper-cased address, so `"MILTON"` also matches `"MILTON ROAD"`
//! and `"HAMILTON"`.

use regex::Regex;

/// Compiled leftmost-first alternation over the configured sector names.
#[derive(Debug, Clone)]
pub struct SectorClassifier {
    pattern: Option<Regex>,
    sectors: Vec<String>,
}

impl SectorClassifier {
    /// Builds a classifier from sector names in priority order.
    ///
    /// Names are upper-cased and blank names are skipped. Regex
    /// metacharacters in names are matched literally.
    #[must_use]
    pub fn new<S: AsRef<str>>(sectors: &[S]) -> Self {
        let sectors: Vec<String> = sectors
            .iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let alternation = sectors
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");

        // Escaped literals always form a valid pattern.
        let pattern = (!sectors.is_empty())
            .then(|| Regex::new(&alternation).unwrap_or_else(|_| unreachable!()));

        Self { pattern, sectors }
    }

    /// Sector names in priority order.
    #[must_use]
    pub fn sectors(&self) -> &[String] {
        &self.sectors
    }

    /// Returns the sector for `address`, or `None` if no name occurs in it.
    #[must_use]
    pub fn classify(&self, address: &str) -> Option<&str> {
        let upper = address.to_uppercase();
        let found = self.pattern.as_ref()?.find(&upper)?;

        self.sectors
            .iter()
            .find(|s| s.as_str() == found.as_str())
            .map(String::as_str)
    }

    /// Returns a classifier over only the sectors for which `keep` is true,
    /// preserving priority order.
    #[must_use]
    pub fn restricted_to(&self, keep: impl Fn(&str) -> bool) -> Self {
        let kept: Vec<&String> = self.sectors.iter().filter(|s| keep(s)).collect();
        Self::new(&kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SectorClassifier {
        SectorClassifier::new(&["FULBOURN", "HISTON", "IMPINGTON", "MILTON", "COTTENHAM"])
    }

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(classifier().classify("14 High St, Fulbourn, CB21"), Some("FULBOURN"));
        assert_eq!(classifier().classify("Land off Station Road, histon"), Some("HISTON"));
    }

    #[test]
    fn no_match_is_none() {
        assert_eq!(classifier().classify("1 Regent Street, Cambridge"), None);
        assert_eq!(classifier().classify(""), None);
    }

    #[test]
    fn earliest_occurrence_wins_over_list_order() {
        // HISTON is listed before COTTENHAM but occurs later in the text.
        assert_eq!(
            classifier().classify("Cottenham Road, Histon"),
            Some("COTTENHAM")
        );
        assert_eq!(
            classifier().classify("Histon Road, Cottenham"),
            Some("HISTON")
        );
    }

    #[test]
    fn list_order_breaks_ties_at_the_same_position() {
        let c = SectorClassifier::new(&["BARTON", "BARTON MILLS"]);
        assert_eq!(c.classify("The Street, Barton Mills"), Some("BARTON"));

        let c = SectorClassifier::new(&["BARTON MILLS", "BARTON"]);
        assert_eq!(c.classify("The Street, Barton Mills"), Some("BARTON MILLS"));
    }

    #[test]
    fn substring_matching_has_no_word_boundaries() {
        assert_eq!(classifier().classify("Hamilton Close"), Some("MILTON"));
    }

    #[test]
    fn names_are_literal() {
        let c = SectorClassifier::new(&["ST. IVES"]);
        assert_eq!(c.classify("Market Hill, St. Ives"), Some("ST. IVES"));
        assert_eq!(c.classify("Market Hill, STXIVES"), None);
    }

    #[test]
    fn empty_list_matches_nothing() {
        let c = SectorClassifier::new::<&str>(&[]);
        assert_eq!(c.classify("Fulbourn"), None);
    }

    #[test]
    fn restriction_keeps_priority_order() {
        let c = classifier().restricted_to(|s| s != "HISTON");
        assert_eq!(c.sectors(), ["FULBOURN", "IMPINGTON", "MILTON", "COTTENHAM"]);
        assert_eq!(c.classify("Histon Road, Cottenham"), Some("COTTENHAM"));
    }
}

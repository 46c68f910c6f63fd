//! RFC 5646 language tag well-formedness checks.
//!
//! The verifier only needs to know whether a tag is *well-formed*; validity against the IANA
//! subtag registry is out of scope, matching what playout servers actually enforce.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

lazy_static! {
    // langtag = language ["-" script] ["-" region] *("-" variant) *("-" extension) ["-" privateuse]
    static ref LANGTAG: Regex = Regex::new(
        r"(?x)^
        (?:
          [A-Za-z]{2,3} (?:-[A-Za-z]{3}){0,3}     # language, optional extlangs
          | [A-Za-z]{4,8}                          # reserved / registered language
        )
        (?:-[A-Za-z]{4})?                          # script
        (?:-(?:[A-Za-z]{2}|[0-9]{3}))?             # region
        (?:-(?:[A-Za-z0-9]{5,8}|[0-9][A-Za-z0-9]{3}))*   # variants
        (?:-[A-WY-Za-wy-z0-9](?:-[A-Za-z0-9]{2,8})+)*    # extensions
        (?:-x(?:-[A-Za-z0-9]{1,8})+)?              # private use
        $"
    )
    .unwrap();
    static ref PRIVATE_USE: Regex = Regex::new(r"^x(-[A-Za-z0-9]{1,8})+$").unwrap();
    static ref REGION: Regex = Regex::new(r"^(?:[A-Za-z]{2}|[0-9]{3})$").unwrap();
}

/// A syntactically well-formed RFC 5646 language tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTag {
    tag: String,
}

impl LanguageTag {
    /// Accepts a tag if it is well-formed, otherwise fails with
    /// [`Error::LanguageTagError`](crate::Error::LanguageTagError).
    pub fn new(tag: &str) -> Result<LanguageTag> {
        if LANGTAG.is_match(tag) || PRIVATE_USE.is_match(tag) {
            Ok(LanguageTag { tag: tag.to_string() })
        } else {
            Err(Error::LanguageTagError(tag.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Check a bare region subtag: two letters or three digits (`001` is the world region).
    pub fn valid_region(region: &str) -> bool {
        REGION.is_match(region)
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag)
    }
}

impl std::str::FromStr for LanguageTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<LanguageTag> {
        LanguageTag::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_tags() {
        for tag in ["en", "en-GB", "de-DE", "fr-CA", "pt-BR", "zh-Hant-TW", "sr-Latn", "es-419", "x-private"] {
            assert!(LanguageTag::new(tag).is_ok(), "{tag} should be accepted");
        }
    }

    #[test]
    fn malformed_tags() {
        for tag in ["", "e", "english-UK", "en_GB", "en-", "-en", "en--GB", "thisiswaytoolongtobealanguage-tag!"] {
            assert!(LanguageTag::new(tag).is_err(), "{tag} should be rejected");
        }
    }

    #[test]
    fn region_subtags() {
        assert!(LanguageTag::valid_region("GB"));
        assert!(LanguageTag::valid_region("001"));
        assert!(!LanguageTag::valid_region("G"));
        assert!(!LanguageTag::valid_region("GBR1"));
    }
}

//! Choosing the name of a place in the preferred language.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static ACCEPT_LANGUAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([a-z_-]+)(?:;\s*q\s*=\s*([01](?:\.\d+)?))?\s*$")
        .expect("Failed to compile accept-language pattern")
});

/// Ordered list of language codes and the name tags derived from them.
///
/// ```rust
/// use mercator::Locales;
///
/// let locales = Locales::from_accept_languages("de-CH, en;q=0.5");
/// assert_eq!(locales.languages(), ["de-CH", "de", "en"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locales {
    languages: Vec<String>,
    name_tags: Vec<String>,
}

impl Default for Locales {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl Locales {
    pub fn new(languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut locales = Self {
            languages: languages.into_iter().map(Into::into).collect(),
            name_tags: Vec::new(),
        };
        locales.add_lang_tags(&["name"]);
        locales.add_tags(&["name", "brand"]);
        locales.add_lang_tags(&["official_name", "short_name"]);
        locales.add_tags(&["official_name", "short_name", "ref"]);
        locales
    }

    /// Parse an HTTP `Accept-Language` header. Malformed parts are skipped.
    pub fn from_accept_languages(header: &str) -> Self {
        let mut candidates: Vec<(String, f64)> = header
            .split(',')
            .filter_map(|desc| {
                let caps = ACCEPT_LANGUAGE_RE.captures(desc)?;
                let weight = caps
                    .get(2)
                    .and_then(|q| q.as_str().parse().ok())
                    .unwrap_or(1.0);
                Some((caps[1].to_owned(), weight))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut languages = Vec::with_capacity(candidates.len());
        for (lang, _) in &candidates {
            languages.push(lang.clone());
            if let Some((base, _)) = lang.split_once('-')
                && candidates.iter().all(|(c, _)| c != base)
            {
                languages.push(base.to_owned());
            }
        }
        Self::new(languages)
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    fn add_tags(&mut self, tags: &[&str]) {
        for tag in tags {
            self.name_tags.push((*tag).to_owned());
            self.name_tags.push(format!("_place_{tag}"));
        }
    }

    fn add_lang_tags(&mut self, tags: &[&str]) {
        for tag in tags {
            for lang in &self.languages {
                self.name_tags.push(format!("{tag}:{lang}"));
                self.name_tags.push(format!("_place_{tag}:{lang}"));
            }
        }
    }

    /// Best matching name, the first name when nothing matches, empty without names.
    pub fn display_name(&self, names: &BTreeMap<String, String>) -> String {
        if names.len() > 1
            && let Some(name) = self.name_tags.iter().find_map(|tag| names.get(tag))
        {
            return name.clone();
        }
        names.values().next().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_accept_languages_weights_and_variants() {
        let locales = Locales::from_accept_languages("en;q=0.3, fr-CA, xx yy, de;q=0.9");
        assert_eq!(locales.languages(), ["fr-CA", "fr", "de", "en"]);
    }

    #[test]
    fn test_region_variant_not_duplicated() {
        let locales = Locales::from_accept_languages("en-GB,en;q=0.8");
        assert_eq!(locales.languages(), ["en-GB", "en"]);
    }

    #[test]
    fn test_display_name_prefers_language() {
        let locales = Locales::new(["de"]);
        let n = names(&[("name", "Germany"), ("name:de", "Deutschland")]);
        assert_eq!(locales.display_name(&n), "Deutschland");
        assert_eq!(Locales::default().display_name(&n), "Germany");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let locales = Locales::new(["fr"]);
        assert_eq!(locales.display_name(&BTreeMap::new()), "");
        let n = names(&[("ref", "A1"), ("brand", "Foo")]);
        assert_eq!(locales.display_name(&n), "Foo");
        assert_eq!(locales.display_name(&names(&[("old_name", "X")])), "X");
    }
}

//! Offline city gazetteer
//!
//! Resolves free-form city strings ("г. Нур-Султан", "Oskemen", "Өскемен")
//! to coordinates without any external service. Lookup order is exact key,
//! alias, then a conservative substring match.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::GeoPoint;

static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(г\.|город|city)\s+").expect("static regex"));
static TRASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zа-я\-\s]").expect("static regex"));
static DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").expect("static regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Substring matches shorter than this are ignored
const MIN_FUZZY_LEN: usize = 4;

const KAZAKHSTAN_CITIES: &[(&str, f64, f64)] = &[
    ("астана", 51.1694, 71.4491),
    ("алматы", 43.2389, 76.8897),
    ("шымкент", 42.3417, 69.5901),
    ("караганда", 49.8060, 73.0850),
    ("усть-каменогорск", 49.9483, 82.6275),
    ("семей", 50.4111, 80.2275),
    ("павлодар", 52.2870, 76.9674),
    ("костанай", 53.2145, 63.6246),
    ("кокшетау", 53.2833, 69.3833),
    ("петропавловск", 54.8753, 69.1620),
    ("орал", 51.2333, 51.3667),
    ("атырау", 47.1167, 51.8833),
    ("актау", 43.6532, 51.1975),
    ("актобе", 50.2839, 57.1660),
    ("тараз", 42.9000, 71.3667),
    ("кызылорда", 44.8528, 65.5092),
];

const KAZAKHSTAN_ALIASES: &[(&str, &str)] = &[
    ("нур-султан", "астана"),
    ("нурсултан", "астана"),
    ("nur-sultan", "астана"),
    ("astana", "астана"),
    ("almaty", "алматы"),
    ("alma-ata", "алматы"),
    ("алма-ата", "алматы"),
    ("shymkent", "шымкент"),
    ("oskemen", "усть-каменогорск"),
    ("өскемен", "усть-каменогорск"),
    ("ust-kamenogorsk", "усть-каменогорск"),
    ("устькаменогорск", "усть-каменогорск"),
    ("karaganda", "караганда"),
    ("qaraghandy", "караганда"),
    ("semey", "семей"),
    ("pavlodar", "павлодар"),
    ("kostanay", "костанай"),
    ("kokshetau", "кокшетау"),
    ("petropavlovsk", "петропавловск"),
    ("уральск", "орал"),
    ("oral", "орал"),
    ("uralsk", "орал"),
    ("atyrau", "атырау"),
    ("aktau", "актау"),
    ("aktobe", "актобе"),
    ("taraz", "тараз"),
    ("kyzylorda", "кызылорда"),
];

/// Normalize a city or office name into a comparable key: lower case,
/// "г."/"город"/"city" prefixes removed, punctuation collapsed, `ё` and
/// Kazakh-specific letters folded to their Russian counterparts.
pub fn normalize_place(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'ё' => 'е',
            'қ' => 'к',
            'ө' => 'о',
            'ү' | 'ұ' => 'у',
            'ә' => 'а',
            'ң' => 'н',
            'ғ' => 'г',
            'һ' => 'х',
            'і' => 'и',
            '—' | '–' => '-',
            other => other,
        })
        .collect();

    let s = PREFIX_RE.replace(&folded, "");
    let s = TRASH_RE.replace_all(&s, " ");
    let s = DASH_RE.replace_all(&s, "-");
    let s = SPACES_RE.replace_all(&s, " ");
    let key = s.trim().to_string();

    // "г. Астана" without a space after the dot
    key.strip_prefix("г.").map(|k| k.trim().to_string()).unwrap_or(key)
}

/// Offline geocoder keyed by normalized place names
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    places: BTreeMap<String, GeoPoint>,
    aliases: BTreeMap<String, String>,
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gazetteer preloaded with the regional centres of Kazakhstan
    pub fn kazakhstan() -> Self {
        let mut gazetteer = Self::new();
        for (name, lat, lon) in KAZAKHSTAN_CITIES {
            gazetteer.insert(name, GeoPoint::new(*lat, *lon));
        }
        for (alias, canonical) in KAZAKHSTAN_ALIASES {
            gazetteer.alias(alias, canonical);
        }
        gazetteer
    }

    pub fn insert(&mut self, name: &str, point: GeoPoint) {
        let key = normalize_place(name);
        if !key.is_empty() {
            self.places.insert(key, point);
        }
    }

    pub fn alias(&mut self, alias: &str, canonical: &str) {
        let key = normalize_place(alias);
        if !key.is_empty() {
            self.aliases.insert(key, normalize_place(canonical));
        }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Coordinates for a free-form place name, if known
    pub fn geocode(&self, raw: &str) -> Option<GeoPoint> {
        let key = normalize_place(raw);
        if key.is_empty() {
            return None;
        }

        if let Some(point) = self.places.get(&key) {
            return Some(*point);
        }
        if let Some(point) = self.aliases.get(&key).and_then(|c| self.places.get(c)) {
            return Some(*point);
        }

        if key.chars().count() < MIN_FUZZY_LEN {
            return None;
        }
        self.places
            .iter()
            .find(|(known, _)| known.contains(key.as_str()) || key.contains(known.as_str()))
            .map(|(_, point)| *point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_place() {
        assert_eq!(normalize_place("  г. Астана "), "астана");
        assert_eq!(normalize_place("Город Алматы"), "алматы");
        assert_eq!(normalize_place("Усть — Каменогорск"), "усть-каменогорск");
        assert_eq!(normalize_place("Қызылорда!"), "кызылорда");
        assert_eq!(normalize_place("Семёй"), "семей");
        assert_eq!(normalize_place("City  Almaty"), "almaty");
    }

    #[test]
    fn test_geocode_exact_alias_and_fuzzy() {
        let gazetteer = Gazetteer::kazakhstan();
        let astana = gazetteer.geocode("Астана").unwrap();
        assert_eq!(gazetteer.geocode("Nur-Sultan"), Some(astana));
        assert_eq!(gazetteer.geocode("г. Нур-Султан"), Some(astana));

        let oral = gazetteer.geocode("Уральск").unwrap();
        assert!((oral.latitude - 51.2333).abs() < 1e-9);

        // "Өскемен" folds to the alias key
        assert!(gazetteer.geocode("Өскемен").is_some());

        // Substring of a longer address
        assert_eq!(gazetteer.geocode("Караганда, мкр. Степной"), gazetteer.geocode("Караганда"));
    }

    #[test]
    fn test_geocode_unknown_and_short() {
        let gazetteer = Gazetteer::kazakhstan();
        assert!(gazetteer.geocode("Berlin").is_none());
        assert!(gazetteer.geocode("").is_none());
        assert!(gazetteer.geocode("ас").is_none());
    }
}

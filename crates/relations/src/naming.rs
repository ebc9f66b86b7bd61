//! Accessor keys derived from relation type names.
//!
//! A relation type named "Related Product" answers to the accessor
//! `related_products`: lower-cased, spaces replaced by underscores, last word
//! pluralized. Accessor names supplied by callers are only lower-cased before
//! comparison, so `cross_sell` never matches "Cross Sell".

/// Words whose plural is the same as the singular.
const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "fish",
    "information",
    "jeans",
    "money",
    "police",
    "rice",
    "series",
    "sheep",
    "species",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("man", "men"),
    ("move", "moves"),
    ("person", "people"),
    ("woman", "women"),
];

/// Normalized accessor key for a relation type name.
pub fn accessor_key(type_name: &str) -> String {
    pluralize(&type_name.to_lowercase().replace(' ', "_"))
}

/// Normalize an accessor name supplied by a caller.
pub fn normalize_accessor(name: &str) -> String {
    name.to_lowercase()
}

/// Pluralize the last `_`-separated word of a lower-case identifier.
pub fn pluralize(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => word.split_at(idx + 1),
        None => ("", word),
    };
    format!("{head}{}", pluralize_word(last))
}

fn pluralize_word(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return (*plural).to_string();
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == word) {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("quiz") {
        return format!("{stem}quizzes");
    }
    for suffix in ["matrix", "vertex", "index"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            return format!("{stem}{}ices", &suffix[..suffix.len() - 2]);
        }
    }
    if ["x", "ch", "ss", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        let consonant = before.is_some_and(|c| !"aeiouy".contains(c));
        if consonant || stem.ends_with("qu") {
            return format!("{stem}ies");
        }
    }
    if let Some(stem) = word.strip_suffix("fe") {
        if !stem.ends_with('f') {
            return format!("{stem}ves");
        }
    }
    if let Some(stem) = word.strip_suffix('f') {
        if stem.ends_with('l') || stem.ends_with('r') {
            return format!("{stem}ves");
        }
    }
    if let Some(stem) = word.strip_suffix("sis") {
        return format!("{stem}ses");
    }
    for suffix in ["tum", "ium"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            return format!("{stem}{}a", &suffix[..suffix.len() - 2]);
        }
    }
    for stem in ["buffalo", "tomato", "potato"] {
        if word.ends_with(stem) {
            return format!("{word}es");
        }
    }
    for suffix in ["alias", "status", "bus"] {
        if word.ends_with(suffix) {
            return format!("{word}es");
        }
    }
    for suffix in ["octopus", "virus"] {
        if let Some(stem) = word.strip_suffix("us").filter(|_| word.ends_with(suffix)) {
            return format!("{stem}i");
        }
    }
    if word.ends_with('s') {
        return word.to_string();
    }
    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_normalize_to_plural_snake_case() {
        assert_eq!(accessor_key("Related Product"), "related_products");
        assert_eq!(accessor_key("Related Products"), "related_products");
        assert_eq!(accessor_key("Cross Sell"), "cross_sells");
        assert_eq!(accessor_key("upsells"), "upsells");
        assert_eq!(accessor_key("Upsell"), "upsells");
        assert_eq!(accessor_key("Accessory"), "accessories");
        assert_eq!(accessor_key("Matching Box"), "matching_boxes");
    }

    #[test]
    fn only_the_last_word_is_pluralized() {
        assert_eq!(pluralize("frequently_bought_together_item"), "frequently_bought_together_items");
        assert_eq!(pluralize("box_set"), "box_sets");
    }

    #[test]
    fn english_inflection_rules() {
        let cases = [
            ("key", "keys"),
            ("day", "days"),
            ("category", "categories"),
            ("match", "matches"),
            ("dish", "dishes"),
            ("glass", "glasses"),
            ("knife", "knives"),
            ("half", "halves"),
            ("analysis", "analyses"),
            ("datum", "data"),
            ("medium", "media"),
            ("tomato", "tomatoes"),
            ("status", "statuses"),
            ("virus", "viri"),
            ("index", "indices"),
            ("quiz", "quizzes"),
            ("person", "people"),
            ("people", "people"),
            ("series", "series"),
            ("equipment", "equipment"),
            ("", ""),
        ];
        for (singular, plural) in cases {
            assert_eq!(pluralize(singular), plural, "pluralize({singular:?})");
        }
    }

    #[test]
    fn accessor_names_are_only_lowercased() {
        assert_eq!(normalize_accessor("Cross_Sells"), "cross_sells");
        assert_eq!(normalize_accessor("CrossSells"), "crosssells");
        assert_eq!(normalize_accessor("cross_sell"), "cross_sell");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Keys do not depend on the casing of the type name.
            #[test]
            fn accessor_key_ignores_case(name in "[A-Za-z]{1,12}( [A-Za-z]{1,12}){0,3}") {
                prop_assert_eq!(accessor_key(&name.to_uppercase()), accessor_key(&name.to_lowercase()));
            }

            /// Keys never contain spaces or upper-case letters.
            #[test]
            fn accessor_key_is_snake_case(name in "[A-Za-z]{1,12}( [A-Za-z]{1,12}){0,3}") {
                let key = accessor_key(&name);
                prop_assert!(!key.contains(' '));
                prop_assert_eq!(key.to_lowercase(), key);
            }
        }
    }
}

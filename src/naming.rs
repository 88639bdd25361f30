//! Name and text helpers shared by the SQL and type builders.

use std::collections::HashSet;

/// Lowercased first letters of each `sep`-separated word: `order_items` -> `oi`.
pub fn lowercase_initials(name: &str, sep: char) -> String {
    name.split(sep)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Return `base` if unused, otherwise `base` + `sep` + the first free counter.
pub fn make_name_not_in_set(base: &str, existing: &HashSet<String>, sep: &str) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{}{}{}", base, sep, i);
        if !existing.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

fn words(name: &str) -> impl Iterator<Item = &str> {
    name.split(['_', ' ', '-']).filter(|w| !w.is_empty())
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `drug_reference` -> `DrugReference`
pub fn upper_camel_case(name: &str) -> String {
    words(name).map(capitalized).collect()
}

/// `drug_reference` -> `drugReference`
pub fn lower_camel_case(name: &str) -> String {
    let mut out = String::new();
    for word in words(name) {
        if out.is_empty() {
            out.push_str(&word.to_lowercase());
        } else {
            out.push_str(&capitalized(word));
        }
    }
    out
}

/// Indent every line of `text` by `spaces`.
pub fn indent_lines(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.split('\n')
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn un_double_quote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_initials() {
        assert_eq!(lowercase_initials("order_items", '_'), "oi");
        assert_eq!(lowercase_initials("Drug", '_'), "d");
        assert_eq!(lowercase_initials("__x", '_'), "x");
    }

    #[test]
    fn test_make_name_not_in_set() {
        let mut set = HashSet::new();
        assert_eq!(make_name_not_in_set("d", &set, ""), "d");
        set.insert("d".to_string());
        set.insert("d1".to_string());
        assert_eq!(make_name_not_in_set("d", &set, ""), "d2");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(upper_camel_case("drug_reference"), "DrugReference");
        assert_eq!(upper_camel_case("DRUG"), "Drug");
        assert_eq!(lower_camel_case("mesh_id"), "meshId");
        assert_eq!(lower_camel_case("ID"), "id");
    }

    #[test]
    fn test_indent_lines() {
        assert_eq!(indent_lines("a\nb", 2), "  a\n  b");
    }

    #[test]
    fn test_un_double_quote() {
        assert_eq!(un_double_quote("\"_id\""), "_id");
        assert_eq!(un_double_quote("id"), "id");
    }
}

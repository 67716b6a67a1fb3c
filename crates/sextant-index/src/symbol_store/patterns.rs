//! Architecture categories inferred from symbol names.

/// Category keywords, in match priority order.
pub const ARCHITECTURE_PATTERNS: &[(&str, &[&str])] = &[
    ("provider", &["Provider", "Backend", "Client", "Connector", "Adapter", "Gateway"]),
    ("service", &["Service", "UseCase", "Interactor", "Manager", "Facade"]),
    ("repository", &["Repository", "Store", "Cache", "DAO", "Registry"]),
    ("controller", &["Controller", "Handler", "Endpoint", "Router", "Route"]),
    ("model", &["Model", "Entity", "Schema", "DTO", "Record", "Domain"]),
    ("factory", &["Factory", "Builder", "Creator", "Producer"]),
    ("middleware", &["Middleware", "Interceptor", "Filter", "Guard", "Pipe"]),
    ("observer", &["Observer", "Listener", "Subscriber", "Watcher", "Hook"]),
    ("strategy", &["Strategy", "Policy", "Algorithm"]),
    ("component", &["Component", "Widget", "View", "Screen", "Page"]),
    ("config", &["Config", "Settings", "Options", "Preferences", "Environment"]),
    ("util", &["Util", "Utils", "Helper", "Helpers", "Common"]),
    ("test", &["Test", "Spec", "Mock", "Stub", "Fake"]),
];

/// Category ordering used by key-component queries. Unlisted categories sort last.
pub const CATEGORY_PRIORITY: &[&str] =
    &["service", "controller", "repository", "provider", "factory", "model"];

/// First category whose keyword is a substring of `name`.
#[must_use]
pub fn categorize_symbol(name: &str) -> Option<&'static str> {
    ARCHITECTURE_PATTERNS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k)))
        .map(|(category, _)| *category)
}

/// `Base*`, `Abstract*`, or `I` followed by an uppercase letter.
#[must_use]
pub fn is_inheritance_anchor(name: &str) -> bool {
    if name.starts_with("Base") || name.starts_with("Abstract") {
        return true;
    }
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(char::is_uppercase)
}

/// Title-cased category, as used in pattern names.
#[must_use]
pub fn title_case(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        assert_eq!(categorize_symbol("OpenAIProvider"), Some("provider"));
        // "Manager" (service) precedes "Cache" (repository) in table order
        assert_eq!(categorize_symbol("CacheManager"), Some("service"));
        assert_eq!(categorize_symbol("parse_args"), None);
    }

    #[test]
    fn anchors() {
        assert!(is_inheritance_anchor("BaseModel"));
        assert!(is_inheritance_anchor("AbstractStore"));
        assert!(is_inheritance_anchor("IRepository"));
        assert!(!is_inheritance_anchor("Item"));
        assert!(!is_inheritance_anchor("I"));
    }

    #[test]
    fn title() {
        assert_eq!(title_case("provider"), "Provider");
        assert_eq!(title_case(""), "");
    }
}

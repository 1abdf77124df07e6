use super::package::*;

#[test]
fn split_module_name_strips_version_and_platform() {
    assert_eq!(split_module_name("five@0.0.1").unwrap(), "five");
    assert_eq!(split_module_name("five@0.0.1+darwin").unwrap(), "five");
    assert_eq!(split_module_name("@scope/five@1.2.0").unwrap(), "@scope/five");
    assert_eq!(split_module_name("five").unwrap(), "five");
}

#[test]
fn split_module_name_rejects_malformed_identifiers() {
    assert!(split_module_name("").is_err());
    assert!(split_module_name("@1.0.0").is_ok()); // scoped marker only, kept as name
    assert!(split_module_name("a,b@1.0").is_err());
    assert!(split_module_name("five@1.0,evil").is_err());
    assert!(split_module_name("five@1.0,").is_err());
}

#[test]
fn contains_token_matches_whole_tokens_only() {
    let value = "five@0.0.11,five@0.0.2";

    assert!(!contains_token(value, "five@0.0.1"));
    assert!(contains_token(value, "five@0.0.11"));
    assert!(contains_token(value, "five@0.0.2"));
    assert!(!contains_token("", "five@0.0.1"));
}

#[test]
fn append_token_is_idempotent() {
    assert_eq!(append_token("", "a@1.0").as_deref(), Some("a@1.0"));
    assert_eq!(append_token("a@1.0", "a@1.1").as_deref(), Some("a@1.0,a@1.1"));
    assert_eq!(append_token("a@1.0,a@1.1", "a@1.1"), None);
    assert_eq!(append_token("a@1.10", "a@1.1").as_deref(), Some("a@1.10,a@1.1"));
}

#[test]
fn remove_token_leaves_longer_versions_alone() {
    assert_eq!(remove_token("five@0.0.1,five@0.0.11", "five@0.0.1"), "five@0.0.11");
    assert_eq!(remove_token("five@0.0.11,five@0.0.1", "five@0.0.1"), "five@0.0.11");
    assert_eq!(remove_token("five@0.0.11", "five@0.0.1"), "five@0.0.11");
}

#[test]
fn remove_token_never_leaves_a_trailing_separator() {
    assert_eq!(remove_token("a@1.0,a@1.1", "a@1.1"), "a@1.0");
    assert_eq!(remove_token("a@1.0", "a@1.0"), "");
    assert_eq!(remove_token("a@1.0,,a@1.1,", "a@1.1"), "a@1.0");
}

#[test]
fn parse_tokens_ignores_empty_entries() {
    let tokens = parse_tokens(",a@1.0,,a@1.1,");

    assert_eq!(tokens.len(), 2);
    assert!(tokens.contains("a@1.0"));
    assert!(tokens.contains("a@1.1"));
    assert!(parse_tokens("").is_empty());
}

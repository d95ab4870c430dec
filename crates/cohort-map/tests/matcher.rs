use cohort_map::{HeaderMatcher, MappingError};

fn canonical() -> Vec<String> {
    ["Animals", "BNT", "TrailsA", "TrailsB", "StroopCW", "LogMemDelay"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

#[test]
fn maps_session_headers_onto_canonical_tests() {
    let matcher = HeaderMatcher::new(canonical());
    let headers = vec![
        "animals".to_string(),
        "Trails A".to_string(),
        "Trails B".to_string(),
        "LogMem Delay".to_string(),
    ];
    let mapping = matcher.match_headers(&headers, "session_1").unwrap();
    let renames = mapping.rename_map();
    assert_eq!(renames.get("animals").map(String::as_str), Some("Animals"));
    assert_eq!(renames.get("Trails A").map(String::as_str), Some("TrailsA"));
    assert_eq!(renames.get("Trails B").map(String::as_str), Some("TrailsB"));
    assert_eq!(
        renames.get("LogMem Delay").map(String::as_str),
        Some("LogMemDelay")
    );
    assert!(mapping.duplicates.is_empty());
}

#[test]
fn floor_is_optional_and_enforced_when_set() {
    let headers = vec!["Subject Weight".to_string()];

    let lenient = HeaderMatcher::new(canonical());
    let mapping = lenient.match_headers(&headers, "session_2").unwrap();
    assert_eq!(mapping.matches.len(), 1);
    assert_eq!(mapping.weak().count(), 1);

    let strict = HeaderMatcher::new(canonical()).with_min_similarity(Some(0.9));
    match strict.match_headers(&headers, "session_2") {
        Err(MappingError::BelowThreshold { header, floor, .. }) => {
            assert_eq!(header, "Subject Weight");
            assert!((floor - 0.9).abs() < f32::EPSILON);
        }
        other => panic!("expected BelowThreshold, got {other:?}"),
    }
}

#[test]
fn first_header_keeps_a_contested_target() {
    let matcher = HeaderMatcher::new(canonical());
    let headers = vec!["BNT".to_string(), "bnt".to_string()];
    let mapping = matcher.match_headers(&headers, "session_3").unwrap();
    assert_eq!(mapping.target_for("BNT"), Some("BNT"));
    assert_eq!(mapping.target_for("bnt"), None);
    assert_eq!(mapping.duplicates.len(), 1);
}

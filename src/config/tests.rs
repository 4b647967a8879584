use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.toc, TocSettings::default());
    assert_eq!(settings.toc.max_level, 3);
    assert_eq!(settings.toc.min_headings, 3);
    assert_eq!(settings.include.max_depth, DEFAULT_MAX_INCLUDE_DEPTH);
    assert_eq!(settings.include.default_flags, FlagSet::default());
    assert_eq!(settings.cache.instruction_cache_limit, 256);
}

#[test]
fn json_logging_switches_format() {
    let mut raw = RawSettings::default();
    raw.logging.json = Some(true);
    raw.logging.level = Some("debug".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn invalid_log_level_is_reported_with_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn toc_levels_are_validated() {
    let mut raw = RawSettings::default();
    raw.toc.top_level = Some(3);
    raw.toc.max_level = Some(2);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "toc.max_level",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.toc.top_level = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "toc.top_level",
            ..
        })
    ));
}

#[test]
fn configured_flags_override_builtin_defaults() {
    let mut raw = RawSettings::default();
    raw.include.flags = Some(vec!["footer".to_string(), "noeditbtn".to_string()]);

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.include.default_flags.footer);
    assert!(!settings.include.default_flags.edit_button);
}

#[test]
fn unknown_configured_flags_are_rejected() {
    let mut raw = RawSettings::default();
    raw.include.flags = Some(vec!["sparkle".to_string()]);

    let err = Settings::from_raw(raw).expect_err("unknown flag");
    assert!(err.to_string().contains("sparkle"));
}

#[test]
fn zero_depth_is_rejected() {
    let mut raw = RawSettings::default();
    raw.include.max_depth = Some(0);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "include.max_depth",
            ..
        })
    ));
}

#[test]
fn blank_strings_fall_back_to_defaults() {
    let mut raw = RawSettings::default();
    raw.include.custom_sort_key = Some("   ".to_string());
    raw.include.default_lang = Some(" de ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.include.custom_sort_key, DEFAULT_CUSTOM_SORT_KEY);
    assert_eq!(settings.include.default_lang, "de");
}

#[test]
fn safe_index_is_on_unless_disabled() {
    assert!(
        Settings::from_raw(RawSettings::default())
            .expect("valid settings")
            .include
            .safe_index
    );

    let mut raw = RawSettings::default();
    raw.include.safe_index = Some(false);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.include.safe_index);
}

use std::path::PathBuf;
use tourline_logger::{LevelFilter, LogSettings, RotationKind};

#[test]
fn missing_fields_fall_back_to_defaults() {
    let settings: LogSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, LogSettings::default());
    assert!(settings.console);
    assert_eq!(settings.level_filter().unwrap(), LevelFilter::INFO);
}

#[test]
fn file_section_is_parsed() {
    let settings: LogSettings = serde_json::from_str(
        r#"{ "level": "warn", "directory": "logs", "rotation": "hourly", "max_files": 3, "json": true }"#,
    )
    .unwrap();

    assert_eq!(settings.directory, Some(PathBuf::from("logs")));
    assert_eq!(settings.rotation, RotationKind::Hourly);
    assert_eq!(settings.max_files, 3);
    assert!(settings.json);
    assert_eq!(settings.level_filter().unwrap(), LevelFilter::WARN);
}

#[test]
fn unknown_rotation_is_rejected() {
    let parsed = serde_json::from_str::<LogSettings>(r#"{ "rotation": "weekly" }"#);
    assert!(parsed.is_err());
}

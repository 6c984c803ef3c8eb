use std::path::PathBuf;

use markstore::{
    config::{BatchConfig, ConfigError, FileEncoding, Settings, ValidationConfig},
    op::MutationOp,
    types::{Section, StockKey},
    validate::{RuleValidator, ValidationError, Validator},
};

#[test]
fn empty_document_yields_defaults() {
    let settings = Settings::from_toml_str("").expect("defaults");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.paths.mark_file, PathBuf::from("mark.dat"));
    assert_eq!(settings.paths.backup_db, None);
    assert_eq!(settings.paths.encoding, FileEncoding::Gbk);
    assert_eq!(settings.backup.max_backups, 30);
    assert_eq!(settings.cache.capacity, 100);
    assert_eq!(settings.validation.max_tip_len, 500);

    let batch = BatchConfig::default();
    assert_eq!(batch.chunk_size, 5);
    assert_eq!(batch.success_threshold, 100.0);
    assert!(batch.auto_rollback);
    assert!(batch.continue_on_failure);
}

#[test]
fn partial_document_overrides_only_named_fields() {
    let settings = Settings::from_toml_str(
        r#"
[paths]
mark_file = "/data/T0002/mark.dat"
backup_db = "/data/backups.db"
encoding = "utf8"

[batch]
chunk_size = 20
success_threshold = 90.0

[validation]
max_token_len = 8
"#,
    )
    .expect("settings");

    assert_eq!(settings.paths.mark_file, PathBuf::from("/data/T0002/mark.dat"));
    assert_eq!(settings.paths.backup_db, Some(PathBuf::from("/data/backups.db")));
    assert_eq!(settings.paths.encoding, FileEncoding::Utf8);
    assert_eq!(settings.batch.chunk_size, 20);
    assert_eq!(settings.batch.success_threshold, 90.0);
    assert!(settings.batch.auto_rollback);
    assert_eq!(settings.validation.max_token_len, 8);
    assert_eq!(settings.validation.max_tip_len, 500);
}

#[test]
fn out_of_range_values_are_rejected() {
    for (doc, field) in [
        ("[batch]\nchunk_size = 0\n", "batch.chunk_size"),
        ("[batch]\nchunk_size = 101\n", "batch.chunk_size"),
        ("[batch]\nsuccess_threshold = 120.0\n", "batch.success_threshold"),
        ("[cache]\ncapacity = 0\n", "cache.capacity"),
        ("[backup]\nmax_backups = 0\n", "backup.max_backups"),
    ] {
        match Settings::from_toml_str(doc) {
            Err(ConfigError::Invalid { field: got, .. }) => assert_eq!(got, field, "{doc}"),
            other => panic!("{doc}: expected invalid, got {other:?}"),
        }
    }
}

#[test]
fn decode_and_io_failures_are_distinguished() {
    let err = Settings::from_toml_str("[batch]\nchunk_size = \"five\"\n").expect_err("type");
    assert!(matches!(err, ConfigError::Toml(_)), "{err}");

    let err = Settings::load("/definitely/not/here.toml").expect_err("missing");
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

fn check(section: Section, op: MutationOp) -> Result<(), ValidationError> {
    let key = StockKey::resolve("600519").expect("key");
    RuleValidator::default().validate(section, &key, &op)
}

fn set(section: Section, value: &str) -> Result<(), ValidationError> {
    check(section, MutationOp::Set(value.to_string()))
}

#[test]
fn rule_validator_enforces_section_grammars() {
    assert!(set(Section::Mark, "5").is_ok());
    assert!(set(Section::Mark, "0").is_err());
    assert!(set(Section::Mark, "10").is_err());

    assert!(set(Section::Tip, "watch earnings").is_ok());
    assert!(set(Section::Tip, "").is_err());
    assert!(set(Section::Tip, " padded").is_err());
    assert!(set(Section::Tip, "two\nlines").is_err());
    assert!(set(Section::Tip, &"长".repeat(500)).is_ok());
    assert!(set(Section::Tip, &"长".repeat(501)).is_err());

    assert!(set(Section::Tipword, "白酒/消费").is_ok());
    assert!(set(Section::Tipword, "白酒//消费").is_err());
    assert!(set(Section::Tipword, &"x".repeat(33)).is_err());
    assert!(check(Section::Tipword, MutationOp::DeleteTokens(vec!["a/b".to_string()])).is_err());
    assert!(check(Section::Tipword, MutationOp::DeleteTokens(vec![])).is_err());
    assert!(check(Section::Tipword, MutationOp::DeleteTokens(vec!["白酒".to_string()])).is_ok());

    assert!(set(Section::Tipcolor, "#FF0000").is_ok());
    assert!(set(Section::Tipcolor, "red!").is_err());
    assert!(set(Section::Time, "2024-01-02 09:30:00").is_ok());
    assert!(set(Section::Time, "2024-01-02T09:30").is_ok());
    assert!(set(Section::Time, "tomorrow").is_err());

    for section in Section::ALL {
        assert!(check(section, MutationOp::DeleteValue).is_ok());
        assert!(check(section, MutationOp::DeleteAllForKey).is_ok());
    }
}

#[test]
fn rule_validator_limits_come_from_config() {
    let validator = RuleValidator::new(ValidationConfig {
        max_tip_len: 4,
        ..ValidationConfig::default()
    });
    let key = StockKey::resolve("600519").expect("key");
    assert!(validator.validate(Section::Tip, &key, &MutationOp::Set("abcd".to_string())).is_ok());
    assert!(validator.validate(Section::Tip, &key, &MutationOp::Set("abcde".to_string())).is_err());

    assert!(matches!(
        validator.validate_key("12"),
        Err(ValidationError::Key(_))
    ));
    assert_eq!(validator.validate_key("600519"), Ok(key));
}

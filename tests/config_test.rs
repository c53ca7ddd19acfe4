//! Loading pool configuration from files and the environment.

use sqlgate::config::load_pool_configs;
use sqlgate::permission::PermissionPolicy;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const FILE_JSON: &str = r#"{
    "from_file": {"type": "postgresql", "user": "app", "password": "pw", "database": "dw",
                  "role": "writer"}
}"#;

const INLINE_JSON: &str = r#"{
    "from_env": {"type": "mysql", "user": "app", "password": "pw", "database": "shop"}
}"#;

fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_wins_over_inline() {
    let file = temp_file(FILE_JSON);
    let configs = load_pool_configs(file.path(), Some(INLINE_JSON)).unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].0, "from_file");
    assert_eq!(configs[0].1.role_or_default(), "writer");
}

#[test]
fn test_missing_file_uses_inline() {
    let configs = load_pool_configs(Path::new("/nonexistent/sqlgate.json"), Some(INLINE_JSON)).unwrap();
    assert_eq!(configs[0].0, "from_env");
    assert_eq!(configs[0].1.port_or_default(), 3306);
}

#[test]
fn test_malformed_file_falls_back_to_inline() {
    let file = temp_file("{ not json");
    let configs = load_pool_configs(file.path(), Some(INLINE_JSON)).unwrap();
    assert_eq!(configs[0].0, "from_env");
}

#[test]
fn test_no_sources_is_empty() {
    let configs = load_pool_configs(Path::new("/nonexistent/sqlgate.json"), Some("  ")).unwrap();
    assert!(configs.is_empty());
    let configs = load_pool_configs(Path::new("/nonexistent/sqlgate.json"), None).unwrap();
    assert!(configs.is_empty());
}

#[test]
fn test_malformed_inline_is_an_error() {
    assert!(load_pool_configs(Path::new("/nonexistent/sqlgate.json"), Some("[1, 2]")).is_err());
}

#[test]
fn test_permissions_file() {
    let file = temp_file(
        r#"{"readonly": ["SELECT"], "writer": ["SELECT", "UPDATE"], "admin": ["SELECT", "UPDATE", "DROP"]}"#,
    );
    let policy = PermissionPolicy::from_file(file.path()).unwrap();
    assert!(policy.allowed("writer").len() == 2);
    assert!(PermissionPolicy::from_file(Path::new("/nonexistent/perm.json")).is_err());
}

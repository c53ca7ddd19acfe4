//! Role-based permission checks.
//!
//! A [`PermissionPolicy`] maps role names to the set of SQL verbs they may run. The
//! built-in table grows strictly from `readonly` to `writer` to `admin`.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// SQL operation keyword used for permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Truncate,
    Show,
    Describe,
    Explain,
}

impl Verb {
    pub const ALL: [Verb; 11] = [
        Verb::Select,
        Verb::Insert,
        Verb::Update,
        Verb::Delete,
        Verb::Create,
        Verb::Alter,
        Verb::Drop,
        Verb::Truncate,
        Verb::Show,
        Verb::Describe,
        Verb::Explain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Drop => "DROP",
            Self::Truncate => "TRUNCATE",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Explain => "EXPLAIN",
        }
    }
}

impl FromStr for Verb {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == upper)
            .ok_or_else(|| DbError::invalid_argument(format!("unknown SQL verb '{}'", s)))
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    ReadOnly,
    Writer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::ReadOnly, Role::Writer, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::Writer => "writer",
            Self::Admin => "admin",
        }
    }

    /// Verbs granted to the role in the built-in table.
    pub fn default_verbs(&self) -> BTreeSet<Verb> {
        use Verb::*;
        let mut verbs: BTreeSet<Verb> = [Select, Show, Describe, Explain].into();
        if matches!(self, Self::Writer | Self::Admin) {
            verbs.extend([Insert, Update, Delete]);
        }
        if matches!(self, Self::Admin) {
            verbs.extend([Create, Alter, Drop, Truncate]);
        }
        verbs
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role to allowed-verb-set lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    roles: HashMap<String, BTreeSet<Verb>>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            roles: Role::ALL
                .into_iter()
                .map(|r| (r.as_str().to_string(), r.default_verbs()))
                .collect(),
        }
    }
}

impl PermissionPolicy {
    /// Build a policy from an external role table.
    ///
    /// The table must define `readonly`, `writer` and `admin`, each a strict superset of
    /// the previous one. Extra roles are accepted as-is.
    pub fn from_table(table: HashMap<String, Vec<String>>) -> DbResult<Self> {
        let mut roles = HashMap::with_capacity(table.len());
        for (role, verbs) in table {
            let set = verbs
                .iter()
                .map(|v| v.parse::<Verb>())
                .collect::<DbResult<BTreeSet<Verb>>>()?;
            roles.insert(role.trim().to_ascii_lowercase(), set);
        }

        let policy = Self { roles };
        for pair in Role::ALL.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            let lower_set = policy.defined(lower)?;
            let upper_set = policy.defined(upper)?;
            if !lower_set.is_subset(upper_set) {
                return Err(DbError::configuration(
                    format!("role '{}' must include every verb of role '{}'", upper, lower),
                    "Make each role a superset of the previous one: readonly, writer, admin",
                ));
            }
            if lower_set == upper_set {
                return Err(DbError::configuration(
                    format!("role '{}' grants nothing beyond role '{}'", upper, lower),
                    "Give each role at least one verb the previous one lacks",
                ));
            }
        }
        Ok(policy)
    }

    /// Parse a JSON object of role name to verb list.
    pub fn from_json(json: &str) -> DbResult<Self> {
        let table: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Self::from_table(table)
    }

    pub fn from_file(path: &Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::configuration(
                format!("cannot read {}: {}", path.display(), e),
                "Check the --permissions path",
            )
        })?;
        Self::from_json(&text)
    }

    fn defined(&self, role: Role) -> DbResult<&BTreeSet<Verb>> {
        self.roles.get(role.as_str()).ok_or_else(|| {
            DbError::configuration(
                format!("role table is missing '{}'", role),
                "Define readonly, writer and admin",
            )
        })
    }

    /// Verbs allowed for `role`. Unknown or empty role names resolve to `readonly`.
    pub fn allowed(&self, role: &str) -> &BTreeSet<Verb> {
        let key = role.trim().to_ascii_lowercase();
        if let Some(verbs) = self.roles.get(&key) {
            return verbs;
        }
        if !key.is_empty() {
            warn!(role = %role, "Unknown role, falling back to readonly");
        }
        self.roles
            .get(Role::ReadOnly.as_str())
            .unwrap_or(&EMPTY_VERBS)
    }

    /// Reject `operations` not granted to `role`. An empty operation set always passes.
    pub fn authorize(&self, operations: &BTreeSet<Verb>, role: &str) -> DbResult<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let allowed = self.allowed(role);
        let unauthorized: Vec<&str> = operations
            .difference(allowed)
            .map(Verb::as_str)
            .collect();
        if unauthorized.is_empty() {
            Ok(())
        } else {
            let role = if role.trim().is_empty() {
                Role::ReadOnly.as_str()
            } else {
                role
            };
            Err(DbError::permission(role, unauthorized.join(", ")))
        }
    }
}

static EMPTY_VERBS: BTreeSet<Verb> = BTreeSet::new();

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(verbs: &[Verb]) -> BTreeSet<Verb> {
        verbs.iter().copied().collect()
    }

    #[test]
    fn test_roles_are_nested() {
        let policy = PermissionPolicy::default();
        let ro = policy.allowed("readonly");
        let w = policy.allowed("writer");
        let a = policy.allowed("admin");
        assert!(ro.is_subset(w) && ro != w);
        assert!(w.is_subset(a) && w != a);
        assert_eq!(a.len(), Verb::ALL.len());
    }

    #[test]
    fn test_empty_operations_always_pass() {
        let policy = PermissionPolicy::default();
        for role in ["readonly", "writer", "admin", "", "nobody"] {
            assert!(policy.authorize(&BTreeSet::new(), role).is_ok());
        }
    }

    #[test]
    fn test_readonly_rejects_mutations() {
        let policy = PermissionPolicy::default();
        let err = policy
            .authorize(&ops(&[Verb::Select, Verb::Delete, Verb::Drop]), "readonly")
            .unwrap_err();
        match err {
            DbError::Permission { role, operations } => {
                assert_eq!(role, "readonly");
                assert_eq!(operations, "DELETE, DROP");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unset_role_is_readonly() {
        let policy = PermissionPolicy::default();
        assert!(policy.authorize(&ops(&[Verb::Select]), "").is_ok());
        let err = policy.authorize(&ops(&[Verb::Insert]), "").unwrap_err();
        assert!(err.to_string().contains("'readonly'"));
        assert!(policy.authorize(&ops(&[Verb::Insert]), "superuser").is_err());
    }

    #[test]
    fn test_writer_and_admin() {
        let policy = PermissionPolicy::default();
        assert!(policy.authorize(&ops(&[Verb::Update]), "Writer").is_ok());
        assert!(policy.authorize(&ops(&[Verb::Truncate]), "writer").is_err());
        assert!(policy.authorize(&ops(&[Verb::Truncate]), "admin").is_ok());
    }

    #[test]
    fn test_from_json_table() {
        let policy = PermissionPolicy::from_json(
            r#"{"readonly": ["SELECT"], "writer": ["select", "INSERT"],
                "admin": ["SELECT", "INSERT", "DROP"]}"#,
        )
        .unwrap();
        assert_eq!(policy.allowed("writer").len(), 2);
        assert!(policy.authorize(&ops(&[Verb::Show]), "readonly").is_err());
    }

    #[test]
    fn test_from_json_rejects_non_nested_table() {
        let err = PermissionPolicy::from_json(
            r#"{"readonly": ["SELECT", "SHOW"], "writer": ["SELECT"], "admin": ["SELECT"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[test]
    fn test_from_json_rejects_equal_adjacent_roles() {
        let err = PermissionPolicy::from_json(
            r#"{"readonly": ["SELECT"], "writer": ["SELECT"], "admin": ["SELECT", "DROP"]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'writer'"));

        let err = PermissionPolicy::from_json(
            r#"{"readonly": ["SELECT"], "writer": ["SELECT", "INSERT"], "admin": ["INSERT", "SELECT"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[test]
    fn test_from_json_rejects_unknown_verb() {
        assert!(
            PermissionPolicy::from_json(
                r#"{"readonly": ["GRANT"], "writer": [], "admin": []}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_verb_parse() {
        assert_eq!("describe".parse::<Verb>().unwrap(), Verb::Describe);
        assert!("MERGE".parse::<Verb>().is_err());
    }
}

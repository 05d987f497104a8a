//! Role derivation for the authorization pipeline.
//!
//! An identity without roles is authorized exactly like a request without an
//! identity: as `anonymous`.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::services::identity::Identity;

pub const ANONYMOUS_ROLE: &str = "anonymous";
pub const ROLE_DELIMITER: char = ',';

/// Set of role names in a stable (sorted) iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn anonymous() -> Self {
        Self(BTreeSet::from([ANONYMOUS_ROLE.to_string()]))
    }

    /// Split a stored `a,b,c` value. Only the delimiter is stripped.
    pub fn from_delimited(raw: &str) -> Self {
        Self::from_names(raw.split(ROLE_DELIMITER))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = names
            .into_iter()
            .filter(|n| !n.as_ref().is_empty())
            .map(|n| n.as_ref().to_string())
            .collect();

        if set.is_empty() {
            Self::anonymous()
        } else {
            Self(set)
        }
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.len() == 1 && self.contains(ANONYMOUS_ROLE)
    }

    pub fn to_delimited(&self) -> String {
        let mut out = String::new();
        for (i, role) in self.iter().enumerate() {
            if i > 0 {
                out.push(ROLE_DELIMITER);
            }
            out.push_str(role);
        }
        out
    }
}

/// Roles for the current request. Total: never fails.
pub fn extract_roles(identity: Option<&Identity>) -> RoleSet {
    match identity {
        Some(identity) => RoleSet::from_delimited(&identity.roles),
        None => RoleSet::anonymous(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::test_identity;

    #[test]
    fn no_identity_is_anonymous() {
        assert_eq!(extract_roles(None), RoleSet::anonymous());
    }

    #[test]
    fn role_less_identity_is_anonymous_not_unrestricted() {
        let identity = test_identity("nobody", "");
        let roles = extract_roles(Some(&identity));

        assert_eq!(roles, extract_roles(None));
        assert!(roles.is_anonymous());
    }

    #[test]
    fn delimited_roles_collapse_into_a_set() {
        let identity = test_identity("tina", "teacher,admin,teacher");
        let roles = extract_roles(Some(&identity));

        assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["admin", "teacher"]);
        assert!(!roles.is_anonymous());
    }

    #[test]
    fn only_the_delimiter_is_stripped() {
        let roles = RoleSet::from_delimited("teacher, admin");

        assert!(roles.contains("teacher"));
        assert!(roles.contains(" admin"));
        assert!(!roles.contains("admin"));
    }

    #[test]
    fn empty_segments_are_ignored() {
        assert_eq!(RoleSet::from_delimited(",,"), RoleSet::anonymous());
        assert_eq!(
            RoleSet::from_delimited("teacher,,").to_delimited(),
            "teacher"
        );
    }

    #[test]
    fn list_and_delimited_forms_agree() {
        let from_list = RoleSet::from_names(vec!["b".to_string(), "a".to_string()]);
        assert_eq!(from_list, RoleSet::from_delimited("a,b"));
        assert_eq!(from_list.to_delimited(), "a,b");
    }
}

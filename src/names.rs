//! Canonical names for timer slots and call collections.
//!
//! Names are registered once at startup. Afterwards free-text input is only
//! ever resolved against that fixed set: abbreviated forms (`auth`,
//! `currentAuth`, `authCalls`) map onto the canonical key (`currentAuthCalls`)
//! and comparison ignores ASCII case.

use std::fmt;
use std::sync::Arc;

use crate::error::QueueError;

const COLLECTION_PREFIX: &str = "current";
const COLLECTION_SUFFIX: &str = "Calls";
const TIMER_SUFFIX: &str = "Timeout";

/// Which registry a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Timer,
    CallCollection,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Timer => f.write_str("timer"),
            NameKind::CallCollection => f.write_str("call collection"),
        }
    }
}

/// Canonical key of a registered timer slot. Only issued by [`NameRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerName(Arc<str>);

/// Canonical key of a registered call collection. Only issued by [`NameRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionName(Arc<str>);

impl TimerName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CollectionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable set of registered timer and collection names.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    timers: Vec<TimerName>,
    collections: Vec<CollectionName>,
}

impl NameRegistry {
    /// Register timer and collection root names.
    ///
    /// Blank names and names that collide case-insensitively after
    /// canonicalization are rejected.
    pub fn new<T, C>(timers: T, collections: C) -> Result<Self, QueueError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut registry = NameRegistry::default();

        for raw in timers {
            let key = timer_key(non_blank(raw.as_ref(), NameKind::Timer)?);
            if registry.lookup_timer(&key).is_some() {
                return Err(QueueError::DuplicateName {
                    kind: NameKind::Timer,
                    name: key,
                });
            }
            registry.timers.push(TimerName(key.into()));
        }

        for raw in collections {
            let key = registered_collection_key(non_blank(raw.as_ref(), NameKind::CallCollection)?);
            if registry.lookup_collection(&key).is_some() {
                return Err(QueueError::DuplicateName {
                    kind: NameKind::CallCollection,
                    name: key,
                });
            }
            registry.collections.push(CollectionName(key.into()));
        }

        Ok(registry)
    }

    /// Resolve a possibly abbreviated timer name.
    pub fn timer(&self, name: &str) -> Option<TimerName> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.lookup_timer(&timer_key(name)).cloned()
    }

    /// Resolve a possibly abbreviated call collection name.
    pub fn collection(&self, name: &str) -> Option<CollectionName> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.lookup_collection(&collection_key(name)).cloned()
    }

    /// Resolve a name of either kind to its canonical string, empty when unregistered.
    pub fn canonical(&self, name: &str, kind: NameKind) -> String {
        let canonical = match kind {
            NameKind::Timer => self.timer(name).map(|t| t.to_string()),
            NameKind::CallCollection => self.collection(name).map(|c| c.to_string()),
        };
        canonical.unwrap_or_default()
    }

    pub fn timers(&self) -> impl Iterator<Item = &TimerName> {
        self.timers.iter()
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionName> {
        self.collections.iter()
    }

    fn lookup_timer(&self, key: &str) -> Option<&TimerName> {
        self.timers.iter().find(|t| t.0.eq_ignore_ascii_case(key))
    }

    fn lookup_collection(&self, key: &str) -> Option<&CollectionName> {
        self.collections.iter().find(|c| c.0.eq_ignore_ascii_case(key))
    }
}

fn non_blank(name: &str, kind: NameKind) -> Result<&str, QueueError> {
    let name = name.trim();
    if name.is_empty() {
        Err(QueueError::BlankName { kind })
    } else {
        Ok(name)
    }
}

fn timer_key(name: &str) -> String {
    if ends_with_ignore_case(name, TIMER_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{TIMER_SUFFIX}")
    }
}

fn collection_key(name: &str) -> String {
    let prefix = if starts_with_ignore_case(name, COLLECTION_PREFIX) {
        ""
    } else {
        COLLECTION_PREFIX
    };
    let suffix = if ends_with_ignore_case(name, COLLECTION_SUFFIX) {
        ""
    } else {
        COLLECTION_SUFFIX
    };
    format!("{prefix}{name}{suffix}")
}

/// Like [`collection_key`], but title-cases a bare root so `realmSearch`
/// registers as `currentRealmSearchCalls`.
fn registered_collection_key(name: &str) -> String {
    if starts_with_ignore_case(name, COLLECTION_PREFIX) {
        return collection_key(name);
    }
    let mut chars = name.chars();
    let titled: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    collection_key(&titled)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value
        .len()
        .checked_sub(suffix.len())
        .and_then(|split| value.get(split..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NameRegistry {
        NameRegistry::new(["auth", "realm", "realmSearch"], ["auth", "realm", "realmSearch"]).unwrap()
    }

    #[test]
    fn test_collection_abbreviations_resolve_to_same_key() {
        let registry = registry();
        for full in ["currentAuthCalls", "currentRealmCalls", "currentRealmSearchCalls"] {
            let expected = registry.collection(full).unwrap();
            assert_eq!(expected.as_str(), full);

            let root = full.trim_start_matches("current").trim_end_matches("Calls");
            for variant in [
                root.to_string(),
                format!("current{root}"),
                format!("{root}Calls"),
                full.to_lowercase(),
                full.to_uppercase(),
            ] {
                assert_eq!(registry.collection(&variant), Some(expected.clone()), "{variant}");
            }
        }
    }

    #[test]
    fn test_timer_abbreviations_resolve_to_same_key() {
        let registry = registry();
        for root in ["auth", "realm", "realmSearch"] {
            let timer = registry.timer(root).unwrap();
            assert_eq!(timer.as_str(), format!("{root}Timeout"));
            assert_eq!(registry.timer(&format!("{root}Timeout")), Some(timer.clone()));
            assert_eq!(registry.timer(&format!("{}TIMEOUT", root.to_uppercase())), Some(timer));
        }
    }

    #[test]
    fn test_unregistered_names_do_not_resolve() {
        let registry = registry();
        assert_eq!(registry.collection("nonExistantCalls"), None);
        assert_eq!(registry.collection("Fake"), None);
        assert_eq!(registry.collection("currentFake"), None);
        assert_eq!(registry.collection(""), None);
        assert_eq!(registry.timer("nonExistantTimeout"), None);
        assert_eq!(registry.timer("   "), None);
        assert_eq!(registry.canonical("fake", NameKind::Timer), "");
        assert_eq!(registry.canonical("auth", NameKind::CallCollection), "currentAuthCalls");
    }

    #[test]
    fn test_kinds_do_not_cross_resolve() {
        let registry = NameRegistry::new(["search"], ["auth"]).unwrap();
        assert!(registry.timer("search").is_some());
        assert_eq!(registry.collection("search"), None);
        assert_eq!(registry.timer("auth"), None);
    }

    #[test]
    fn test_registration_rejects_blank_and_duplicate_names() {
        assert_eq!(
            NameRegistry::new(["auth", " "], Vec::<&str>::new()).unwrap_err(),
            QueueError::BlankName { kind: NameKind::Timer }
        );
        assert_eq!(
            NameRegistry::new(["auth", "AUTHTimeout"], Vec::<&str>::new()).unwrap_err(),
            QueueError::DuplicateName {
                kind: NameKind::Timer,
                name: "AUTHTimeout".to_string()
            }
        );
        assert!(matches!(
            NameRegistry::new(Vec::<&str>::new(), ["auth", "currentAuthCalls"]),
            Err(QueueError::DuplicateName { kind: NameKind::CallCollection, .. })
        ));
    }
}

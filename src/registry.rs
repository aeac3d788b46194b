//! Bookkeeping of the children a UnifiedPushServer owns, published in its status.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Kind label to the names of the children of that kind.
///
/// Names are unique per kind. Removing a name moves the last name of the kind into its slot,
/// so the order of the remaining names is not stable across removals.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, JsonSchema)]
#[serde(transparent)]
pub struct SecondaryResources(BTreeMap<String, Vec<String>>);

impl SecondaryResources {
    pub fn names(&self, kind: &str) -> &[String] {
        self.0.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.names(kind).iter().any(|known| known == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, Vec<&str>); N]> for SecondaryResources {
    fn from(entries: [(&str, Vec<&str>); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(kind, names)| (kind.to_owned(), names.into_iter().map(str::to_owned).collect()))
                .collect(),
        )
    }
}

/// Adding and removing children of a registry that may not exist yet.
pub trait TrackChildren {
    /// Records `name` under `kind`; a no-op when it is already recorded.
    fn add(&mut self, kind: &str, name: &str);

    /// Forgets `name` under `kind`; a no-op when it is not recorded.
    fn remove(&mut self, kind: &str, name: &str);
}

impl TrackChildren for SecondaryResources {
    fn add(&mut self, kind: &str, name: &str) {
        let names = self.0.entry(kind.to_owned()).or_default();
        if !names.iter().any(|known| known == name) {
            names.push(name.to_owned());
        }
    }

    fn remove(&mut self, kind: &str, name: &str) {
        let Some(names) = self.0.get_mut(kind) else {
            return;
        };
        if let Some(index) = names.iter().position(|known| known == name) {
            names.swap_remove(index);
        }
    }
}

impl<T: TrackChildren> TrackChildren for Option<T> {
    fn add(&mut self, kind: &str, name: &str) {
        if let Some(registry) = self {
            registry.add(kind, name);
        }
    }

    fn remove(&mut self, kind: &str, name: &str) {
        if let Some(registry) = self {
            registry.remove(kind, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::nil_registry(None, None)]
    #[case::missing_kind(
        Some(SecondaryResources::default()),
        Some(SecondaryResources::from([("Deployment", vec!["example"])]))
    )]
    #[case::empty_kind(
        Some(SecondaryResources::from([("Deployment", vec![])])),
        Some(SecondaryResources::from([("Deployment", vec!["example"])]))
    )]
    #[case::new_name(
        Some(SecondaryResources::from([("Deployment", vec!["example-postgresql"])])),
        Some(SecondaryResources::from([("Deployment", vec!["example-postgresql", "example"])]))
    )]
    #[case::existing_name(
        Some(SecondaryResources::from([("Deployment", vec!["example"])])),
        Some(SecondaryResources::from([("Deployment", vec!["example"])]))
    )]
    fn test_add(#[case] mut registry: Option<SecondaryResources>, #[case] expected: Option<SecondaryResources>) {
        // When: Adding a deployment
        registry.add("Deployment", "example");

        // Then: The registry matches
        assert_eq!(registry, expected);
    }

    #[rstest]
    #[case::nil_registry(None, "c", None)]
    #[case::missing_kind(
        Some(SecondaryResources::default()),
        "c",
        Some(SecondaryResources::default())
    )]
    #[case::empty_kind(
        Some(SecondaryResources::from([("Secret", vec![])])),
        "c",
        Some(SecondaryResources::from([("Secret", vec![])]))
    )]
    #[case::missing_name(
        Some(SecondaryResources::from([("Secret", vec!["a", "b"])])),
        "c",
        Some(SecondaryResources::from([("Secret", vec!["a", "b"])]))
    )]
    #[case::from_end(
        Some(SecondaryResources::from([("Secret", vec!["a", "b", "c"])])),
        "c",
        Some(SecondaryResources::from([("Secret", vec!["a", "b"])]))
    )]
    #[case::from_head(
        Some(SecondaryResources::from([("Secret", vec!["a", "b", "c"])])),
        "a",
        Some(SecondaryResources::from([("Secret", vec!["c", "b"])]))
    )]
    #[case::from_middle(
        Some(SecondaryResources::from([("Secret", vec!["a", "b", "c"])])),
        "b",
        Some(SecondaryResources::from([("Secret", vec!["a", "c"])]))
    )]
    #[case::only_name(
        Some(SecondaryResources::from([("Secret", vec!["a"])])),
        "a",
        Some(SecondaryResources::from([("Secret", vec![])]))
    )]
    fn test_remove(
        #[case] mut registry: Option<SecondaryResources>,
        #[case] name: &str,
        #[case] expected: Option<SecondaryResources>,
    ) {
        // When: Removing a secret
        registry.remove("Secret", name);

        // Then: The registry matches
        assert_eq!(registry, expected);
    }

    #[test]
    fn test_add_then_remove_restores_names() {
        // Given: A registry with two routes
        let mut registry = SecondaryResources::from([("Route", vec!["a", "b"])]);

        // When: Adding and removing a third one
        registry.add("Route", "c");
        registry.remove("Route", "c");

        // Then: The earlier names remain
        assert_eq!(registry.names("Route"), ["a", "b"]);
        assert!(registry.contains("Route", "a"));
        assert!(!registry.contains("Route", "c"));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let registry = SecondaryResources::from([("Service", vec!["example-unifiedpush"])]);

        assert_eq!(
            serde_json::to_value(&registry).unwrap(),
            serde_json::json!({ "Service": ["example-unifiedpush"] })
        );
    }
}

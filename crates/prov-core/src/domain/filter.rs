//! Scan filter: which advertised devices a request is interested in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::device::DeviceRecord;

/// Name-prefix and service-id constraints for one scan.
///
/// Both constraints are optional.  A record matches when:
///
/// - its name starts with `name_prefix` (case-sensitive), and
/// - it advertises at least one id in `service_ids`.
///
/// `None` and an empty set both mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ids: Option<BTreeSet<String>>,
}

impl ScanFilter {
    /// A filter that matches every device.
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter targeting one device by name.
    ///
    /// Transports only understand prefixes, so the full name is used as the
    /// prefix; callers narrow further with [`DeviceRecord::name`] equality.
    pub fn exact_name(name: impl Into<String>) -> Self {
        Self {
            name_prefix: Some(name.into()),
            service_ids: None,
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_service_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Returns `true` if `name` satisfies the prefix constraint.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_prefix
            .as_deref()
            .map_or(true, |prefix| name.starts_with(prefix))
    }

    /// Returns `true` if `record` satisfies both constraints.
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        if !self.matches_name(&record.name) {
            return false;
        }
        match &self.service_ids {
            Some(ids) if !ids.is_empty() => ids.iter().any(|id| record.advertises(id)),
            _ => true,
        }
    }

    /// Returns `true` if the filter imposes no constraint at all.
    pub fn is_unconstrained(&self) -> bool {
        self.name_prefix.as_deref().map_or(true, str::is_empty)
            && self.service_ids.as_ref().map_or(true, BTreeSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::TransportKind;

    fn device(name: &str, services: &[&str]) -> DeviceRecord {
        DeviceRecord::advertised(
            name,
            TransportKind::RadioLink,
            services.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_any_filter_matches_everything() {
        let filter = ScanFilter::any();
        assert!(filter.is_unconstrained());
        assert!(filter.matches(&device("whatever", &[])));
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let filter = ScanFilter::any().with_name_prefix("PROV_");
        assert!(filter.matches(&device("PROV_1A2B", &[])));
        assert!(!filter.matches(&device("prov_1a2b", &[])));
    }

    #[test]
    fn test_prefix_must_be_at_start_of_name() {
        let filter = ScanFilter::any().with_name_prefix("PROV");
        assert!(!filter.matches(&device("MY_PROV_01", &[])));
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        let filter = ScanFilter::any().with_name_prefix("");
        assert!(filter.matches(&device("anything", &[])));
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn test_service_ids_require_at_least_one_advertised() {
        // Arrange
        let filter = ScanFilter::any().with_service_ids(["svc-a", "svc-b"]);

        // Act / Assert
        assert!(filter.matches(&device("d1", &["svc-b", "svc-z"])));
        assert!(!filter.matches(&device("d2", &["svc-z"])));
        assert!(!filter.matches(&device("d3", &[])));
    }

    #[test]
    fn test_empty_service_set_imposes_no_constraint() {
        let filter = ScanFilter::any().with_service_ids(Vec::<String>::new());
        assert!(filter.matches(&device("d1", &[])));
    }

    #[test]
    fn test_both_constraints_must_hold() {
        let filter = ScanFilter::any()
            .with_name_prefix("PROV_")
            .with_service_ids(["svc-a"]);
        assert!(filter.matches(&device("PROV_1", &["svc-a"])));
        assert!(!filter.matches(&device("PROV_1", &["svc-b"])));
        assert!(!filter.matches(&device("OTHER", &["svc-a"])));
    }

    #[test]
    fn test_exact_name_filter_uses_full_name_as_prefix() {
        let filter = ScanFilter::exact_name("PROV_1A");
        assert_eq!(filter.name_prefix.as_deref(), Some("PROV_1A"));
        assert!(filter.matches_name("PROV_1A"));
        assert!(!filter.matches_name("PROV_1"));
    }
}

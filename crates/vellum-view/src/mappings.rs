use std::collections::BTreeMap;

use vellum_engine::Snapshot;

use crate::error::{ViewError, ViewResult};

/// Location of an item inside a view.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexPath {
    pub group: String,
    pub section: usize,
    pub index: usize,
}

/// Group, section and row bookkeeping of a view at one snapshot.
///
/// Sections are the non-empty groups, in the view's declared group order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewMappings {
    view_name: String,
    commit: u64,
    all_groups: Vec<String>,
    groups: BTreeMap<String, Vec<String>>,
    sections: Vec<String>,
}

impl ViewMappings {
    /// Read the view's materialized index from `snapshot`.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        view_name: &str,
        all_groups: Vec<String>,
    ) -> ViewResult<Self> {
        let index = snapshot.extension(view_name)?;
        let groups = index
            .groups()
            .map(|group| (group.to_string(), index.keys_in(group).to_vec()))
            .collect();
        Self::from_groups(view_name, snapshot.commit(), all_groups, groups)
    }

    /// Build mappings from per-group key lists.
    pub fn from_groups(
        view_name: &str,
        commit: u64,
        all_groups: Vec<String>,
        mut groups: BTreeMap<String, Vec<String>>,
    ) -> ViewResult<Self> {
        groups.retain(|_, keys| !keys.is_empty());
        if let Some(undeclared) = groups.keys().find(|g| !all_groups.contains(*g)) {
            return Err(ViewError::InconsistentMapping {
                view: view_name.to_string(),
                group: undeclared.clone(),
            });
        }

        let sections = all_groups
            .iter()
            .filter(|group| groups.contains_key(*group))
            .cloned()
            .collect();

        Ok(Self {
            view_name: view_name.to_string(),
            commit,
            all_groups,
            groups,
            sections,
        })
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Commit of the snapshot the mappings were read from.
    pub fn commit(&self) -> u64 {
        self.commit
    }

    pub fn all_groups(&self) -> &[String] {
        &self.all_groups
    }

    /// Number of non-empty groups.
    pub fn number_of_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn number_of_items(&self, section: usize) -> usize {
        self.group_for_section(section)
            .map_or(0, |group| self.number_of_items_in_group(group))
    }

    pub fn number_of_items_in_group(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, Vec::len)
    }

    pub fn total_items(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn group_for_section(&self, section: usize) -> Option<&str> {
        self.sections.get(section).map(String::as_str)
    }

    pub fn section_for_group(&self, group: &str) -> Option<usize> {
        self.sections.iter().position(|g| g == group)
    }

    /// Section groups in order.
    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// Ordered keys of one group.
    pub fn keys_in_group(&self, group: &str) -> &[String] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ordered keys of one section.
    pub fn keys_in_section(&self, section: usize) -> &[String] {
        self.group_for_section(section)
            .map(|group| self.keys_in_group(group))
            .unwrap_or(&[])
    }

    pub fn item_at(&self, section: usize, index: usize) -> Option<&str> {
        self.keys_in_section(section).get(index).map(String::as_str)
    }

    /// Location of `key`, if the view contains it.
    pub fn index_path_of(&self, key: &str) -> Option<IndexPath> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(section, group)| {
                let index = self.groups.get(group)?.iter().position(|k| k == key)?;
                Some(IndexPath {
                    group: group.clone(),
                    section,
                    index,
                })
            })
    }

    /// Per-group key lists of non-empty groups.
    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(entries: &[(&str, Vec<&str>)]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(g, keys)| (g.to_string(), keys.iter().map(|k| k.to_string()).collect()))
            .collect()
    }

    fn declared() -> Vec<String> {
        vec!["adult".into(), "minor".into()]
    }

    #[test]
    fn sections_follow_declared_order() {
        let m = ViewMappings::from_groups(
            "v",
            3,
            vec!["minor".into(), "adult".into()],
            groups(&[("adult", vec!["u1", "u3"]), ("minor", vec!["u2"])]),
        )
        .unwrap();

        assert_eq!(m.number_of_groups(), 2);
        assert_eq!(m.number_of_sections(), 2);
        assert_eq!(m.group_for_section(0), Some("minor"));
        assert_eq!(m.section_for_group("adult"), Some(1));
        assert_eq!(m.number_of_items(1), 2);
        assert_eq!(m.item_at(1, 1), Some("u3"));
        assert_eq!(m.total_items(), 3);
        assert_eq!(
            m.index_path_of("u3"),
            Some(IndexPath {
                group: "adult".into(),
                section: 1,
                index: 1
            })
        );
        assert_eq!(m.commit(), 3);
    }

    #[test]
    fn empty_groups_have_no_section() {
        let m = ViewMappings::from_groups("v", 0, declared(), groups(&[("adult", vec!["u1"]), ("minor", vec![])]))
            .unwrap();
        assert_eq!(m.number_of_sections(), 1);
        assert_eq!(m.number_of_groups(), 1);
        assert_eq!(m.section_for_group("minor"), None);
        assert_eq!(m.number_of_items(5), 0);
        assert!(m.item_at(0, 1).is_none());
    }

    #[test]
    fn undeclared_group_is_inconsistent() {
        let err = ViewMappings::from_groups("v", 0, declared(), groups(&[("senior", vec!["u9"])])).unwrap_err();
        assert!(matches!(err, ViewError::InconsistentMapping { group, .. } if group == "senior"));
    }

    #[test]
    fn unregistered_view_is_missing() {
        let err = ViewMappings::from_snapshot(&Snapshot::default(), "v", declared()).unwrap_err();
        assert!(matches!(
            err,
            ViewError::Engine(vellum_engine::EngineError::MissingExtension(_))
        ));
    }
}

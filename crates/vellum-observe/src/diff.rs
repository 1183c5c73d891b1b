//! Reconciliation of two view mappings into row and section changes.
//!
//! Survivors that keep their group are split by whether any commit touched
//! them. A weighted longest increasing subsequence over their old positions
//! (in new order) picks the survivors that stay in place; untouched items
//! outweigh every touched item combined, so they are never reported. A
//! touched survivor in the subsequence is an `Update`, anything else that
//! changed position is a `Move`.

use std::collections::{BTreeMap, HashMap};

use vellum_view::{IndexPath, ViewMappings};

/// Kind of a row change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Delete,
    Move,
    Update,
}

/// One item-level change between two mappings.
///
/// `from` refers to the old mappings and `to` to the new ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub key: String,
    pub from: Option<IndexPath>,
    pub to: Option<IndexPath>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionChangeKind {
    Insert,
    Delete,
}

/// A group appearing or disappearing.
///
/// `section` is the old index for deletes and the new index for inserts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionChange {
    pub kind: SectionChangeKind,
    pub group: String,
    pub section: usize,
}

/// Everything that changed in a view between two snapshots.
///
/// Rows are ordered deletes (descending old position), inserts (ascending new
/// position), moves, then updates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    pub sections: Vec<SectionChange>,
    pub rows: Vec<RowChange>,
}

impl ViewUpdate {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.rows.is_empty()
    }

    /// Rows of one kind, in delivery order.
    pub fn rows_of(&self, kind: ChangeKind) -> impl Iterator<Item = &RowChange> {
        self.rows.iter().filter(move |row| row.kind == kind)
    }

    /// Apply the update to per-group key lists holding the old state.
    pub fn apply_to(&self, groups: &mut BTreeMap<String, Vec<String>>) {
        let mut removals: Vec<&IndexPath> = self
            .rows
            .iter()
            .filter(|row| matches!(row.kind, ChangeKind::Delete | ChangeKind::Move))
            .filter_map(|row| row.from.as_ref())
            .collect();
        removals.sort_by(|a, b| (&a.group, b.index).cmp(&(&b.group, a.index)));
        for path in removals {
            if let Some(keys) = groups.get_mut(&path.group) {
                if path.index < keys.len() {
                    keys.remove(path.index);
                }
            }
        }

        let mut insertions: Vec<(&IndexPath, &str)> = self
            .rows
            .iter()
            .filter(|row| matches!(row.kind, ChangeKind::Insert | ChangeKind::Move))
            .filter_map(|row| row.to.as_ref().map(|to| (to, row.key.as_str())))
            .collect();
        insertions.sort_by(|(a, _), (b, _)| (&a.group, a.index).cmp(&(&b.group, b.index)));
        for (path, key) in insertions {
            let keys = groups.entry(path.group.clone()).or_default();
            let index = path.index.min(keys.len());
            keys.insert(index, key.to_string());
        }

        groups.retain(|_, keys| !keys.is_empty());
    }
}

/// Diff `before` against `after`.
///
/// `touched` reports whether any commit between the two mappings wrote or
/// removed a key.
pub fn compute(before: &ViewMappings, after: &ViewMappings, touched: impl Fn(&str) -> bool) -> ViewUpdate {
    let old = positions(before);
    let new = positions(after);
    let mut update = ViewUpdate::default();

    for (section, group) in before.sections().iter().enumerate().rev() {
        if after.section_for_group(group).is_none() {
            update.sections.push(SectionChange {
                kind: SectionChangeKind::Delete,
                group: group.clone(),
                section,
            });
        }
    }
    for (section, group) in after.sections().iter().enumerate() {
        if before.section_for_group(group).is_none() {
            update.sections.push(SectionChange {
                kind: SectionChangeKind::Insert,
                group: group.clone(),
                section,
            });
        }
    }

    let mut deletes: Vec<RowChange> = old
        .iter()
        .filter(|(key, _)| !new.contains_key(*key))
        .map(|(key, path)| RowChange {
            kind: ChangeKind::Delete,
            key: key.to_string(),
            from: Some(path.clone()),
            to: None,
        })
        .collect();
    deletes.sort_by(|a, b| sort_key(&b.from).cmp(&sort_key(&a.from)));

    let mut inserts: Vec<RowChange> = new
        .iter()
        .filter(|(key, _)| !old.contains_key(*key))
        .map(|(key, path)| RowChange {
            kind: ChangeKind::Insert,
            key: key.to_string(),
            from: None,
            to: Some(path.clone()),
        })
        .collect();
    inserts.sort_by_key(|row| sort_key(&row.to));

    let mut moves = Vec::new();
    let mut updates = Vec::new();
    for (section, group) in after.sections().iter().enumerate() {
        // Survivors of this group, in new order.
        let mut survivors = Vec::new();
        for (index, key) in after.keys_in_group(group).iter().enumerate() {
            let Some(from) = old.get(key.as_str()) else {
                continue;
            };
            let to = IndexPath {
                group: group.clone(),
                section,
                index,
            };
            if from.group != *group {
                moves.push(row(ChangeKind::Move, key, from, to));
            } else {
                survivors.push((key, from, to));
            }
        }

        let sequence: Vec<(usize, u64)> = survivors
            .iter()
            .map(|(key, from, _)| {
                let weight = if touched(key.as_str()) { 1 } else { survivors.len() as u64 + 1 };
                (from.index, weight)
            })
            .collect();
        let in_place = stationary(&sequence);

        for ((key, from, to), stays) in survivors.into_iter().zip(in_place) {
            if !stays {
                moves.push(row(ChangeKind::Move, key, from, to));
            } else if touched(key.as_str()) {
                updates.push(row(ChangeKind::Update, key, from, to));
            }
        }
    }

    update.rows.extend(deletes);
    update.rows.extend(inserts);
    update.rows.extend(moves);
    update.rows.extend(updates);
    update
}

fn row(kind: ChangeKind, key: &str, from: &IndexPath, to: IndexPath) -> RowChange {
    RowChange {
        kind,
        key: key.to_string(),
        from: Some(from.clone()),
        to: Some(to),
    }
}

fn sort_key(path: &Option<IndexPath>) -> (usize, usize) {
    path.as_ref().map_or((0, 0), |p| (p.section, p.index))
}

fn positions(mappings: &ViewMappings) -> HashMap<&str, IndexPath> {
    let mut positions = HashMap::with_capacity(mappings.total_items());
    for (section, group) in mappings.sections().iter().enumerate() {
        for (index, key) in mappings.keys_in_group(group).iter().enumerate() {
            positions.insert(
                key.as_str(),
                IndexPath {
                    group: group.clone(),
                    section,
                    index,
                },
            );
        }
    }
    positions
}

/// Maximum-weight strictly increasing subsequence of `(value, weight)` pairs.
///
/// Returns, per element, whether it belongs to the chosen subsequence.
/// Values must be distinct. Runs in O(n log n) with a max Fenwick tree.
fn stationary(sequence: &[(usize, u64)]) -> Vec<bool> {
    let n = sequence.len();
    let size = sequence.iter().map(|(value, _)| value + 1).max().unwrap_or(0);
    let mut tree: Vec<(u64, Option<usize>)> = vec![(0, None); size + 1];
    let mut best = vec![0u64; n];
    let mut previous = vec![None; n];

    for (i, &(value, weight)) in sequence.iter().enumerate() {
        // Best chain ending in a value below `value` (tree positions 1..=value).
        let mut pos = value;
        let mut prefix = (0, None);
        while pos > 0 {
            if tree[pos].0 > prefix.0 {
                prefix = tree[pos];
            }
            pos -= pos & pos.wrapping_neg();
        }

        best[i] = prefix.0 + weight;
        previous[i] = prefix.1;

        let mut pos = value + 1;
        while pos <= size {
            if best[i] > tree[pos].0 {
                tree[pos] = (best[i], Some(i));
            }
            pos += pos & pos.wrapping_neg();
        }
    }

    let mut keep = vec![false; n];
    let mut cursor = (0..n).max_by_key(|&i| best[i]);
    while let Some(i) = cursor {
        keep[i] = true;
        cursor = previous[i];
    }
    keep
}

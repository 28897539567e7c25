use stash_types::{Fragment, Map, Value};
use tracing::debug;

/// Merge `incoming` into `acc`.
///
/// When both sides are maps they are unioned recursively. In every other
/// case `incoming` replaces `acc` (last write wins at the leaves).
pub fn merge_values(acc: &mut Value, incoming: Value) {
    match (acc, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => merge_maps(existing, incoming),
        (slot, incoming) => *slot = incoming,
    }
}

fn merge_maps(acc: &mut Map, incoming: Map) {
    for (key, value) in incoming {
        match acc.get_mut(&key) {
            Some(existing) => merge_values(existing, value),
            None => {
                acc.insert(key, value);
            }
        }
    }
}

/// Fold one fragment into an accumulator map.
///
/// A root absent from `acc` receives the fragment's subtree unchanged, even
/// when that subtree is empty. A root already present is merged recursively
/// with [`merge_values`].
pub fn deep_merge(acc: &mut Map, fragment: Fragment) {
    let Fragment { root, subtree } = fragment;
    let root = root.into_string();
    match acc.get_mut(&root) {
        Some(existing) => merge_values(existing, Value::Object(subtree)),
        None => {
            acc.insert(root, Value::Object(subtree));
        }
    }
}

/// Fold an ordered sequence of fragments into one map, left to right.
///
/// An empty sequence yields an empty map.
pub fn merge_fragments<I>(fragments: I) -> Map
where
    I: IntoIterator<Item = Fragment>,
{
    let mut folder = FragmentFolder::new();
    folder.extend(fragments);
    folder.finish()
}

/// Single accumulation point for fragments arriving one at a time.
///
/// Each fold depends on the state left by earlier folds, so fragments produced
/// by concurrent workers must be funnelled through one folder in sequence.
#[derive(Clone, Debug, Default)]
pub struct FragmentFolder {
    acc: Map,
    folded: usize,
}

impl FragmentFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the accumulator.
    pub fn fold(&mut self, fragment: Fragment) {
        deep_merge(&mut self.acc, fragment);
        self.folded += 1;
    }

    /// Number of fragments folded so far.
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Number of distinct roots accumulated so far.
    pub fn len(&self) -> usize {
        self.acc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    /// The accumulated map so far.
    pub fn as_map(&self) -> &Map {
        &self.acc
    }

    /// Consume the folder, returning the merged map.
    pub fn finish(self) -> Map {
        debug!(fragments = self.folded, roots = self.acc.len(), "fragments merged");
        self.acc
    }
}

impl Extend<Fragment> for FragmentFolder {
    fn extend<T: IntoIterator<Item = Fragment>>(&mut self, iter: T) {
        for fragment in iter {
            self.fold(fragment);
        }
    }
}

impl FromIterator<Fragment> for FragmentFolder {
    fn from_iter<T: IntoIterator<Item = Fragment>>(iter: T) -> Self {
        let mut folder = Self::new();
        folder.extend(iter);
        folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn fragment(value: Value) -> Fragment {
        Fragment::try_from(value).unwrap()
    }

    fn merged(values: Vec<Value>) -> Value {
        Value::Object(merge_fragments(values.into_iter().map(fragment)))
    }

    #[test]
    fn empty_sequence_yields_empty_map() {
        assert!(merge_fragments(Vec::new()).is_empty());
    }

    #[test]
    fn empty_subtree_still_creates_root() {
        assert_eq!(merged(vec![json!({"a": {}})]), json!({"a": {}}));
    }

    #[test]
    fn disjoint_roots_are_unioned() {
        assert_eq!(
            merged(vec![json!({"a": {"x": 1}}), json!({"b": {"y": 2}})]),
            json!({"a": {"x": 1}, "b": {"y": 2}})
        );
    }

    #[test]
    fn conflicting_leaf_takes_last_value() {
        assert_eq!(
            merged(vec![json!({"a": {"x": 1}}), json!({"a": {"x": 2}})]),
            json!({"a": {"x": 2}})
        );
    }

    #[test]
    fn shared_root_unions_subtrees() {
        assert_eq!(
            merged(vec![json!({"a": {"x": 1}}), json!({"a": {"y": 2}})]),
            json!({"a": {"x": 1, "y": 2}})
        );
    }

    #[test]
    fn nested_maps_merge_recursively() {
        assert_eq!(
            merged(vec![
                json!({"a": {"x": {"p": 1, "q": 1}}}),
                json!({"a": {"x": {"q": 2, "r": 3}}}),
            ]),
            json!({"a": {"x": {"p": 1, "q": 2, "r": 3}}})
        );
    }

    #[test]
    fn scalar_replaces_map_and_map_replaces_scalar() {
        assert_eq!(
            merged(vec![json!({"a": {"x": {"p": 1}}}), json!({"a": {"x": 5}})]),
            json!({"a": {"x": 5}})
        );
        assert_eq!(
            merged(vec![json!({"a": {"x": 5}}), json!({"a": {"x": {"p": 1}}})]),
            json!({"a": {"x": {"p": 1}}})
        );
    }

    #[test]
    fn arrays_are_leaves() {
        assert_eq!(
            merged(vec![json!({"a": {"x": [1, 2]}}), json!({"a": {"x": [3]}})]),
            json!({"a": {"x": [3]}})
        );
    }

    #[test]
    fn empty_subtree_does_not_erase_existing_root() {
        assert_eq!(
            merged(vec![json!({"a": {"x": 1}}), json!({"a": {}})]),
            json!({"a": {"x": 1}})
        );
    }

    #[test]
    fn ini_and_zip_fragments_share_a_root() {
        let result = merged(vec![
            json!({"av": {"ini": {"name": "AV.ini", "size": "0.0 MB"}}}),
            json!({"av": {"zip": {"name": "AV.zip", "size": "32.6 MB"}}}),
        ]);
        assert_eq!(
            result,
            json!({"av": {
                "ini": {"name": "AV.ini", "size": "0.0 MB"},
                "zip": {"name": "AV.zip", "size": "32.6 MB"}
            }})
        );
    }

    #[test]
    fn folder_counts_fragments_and_roots() {
        let mut folder = FragmentFolder::new();
        assert!(folder.is_empty());
        folder.fold(fragment(json!({"a": {"x": 1}})));
        folder.fold(fragment(json!({"a": {"y": 1}})));
        folder.fold(fragment(json!({"b": {}})));
        assert_eq!(folder.folded(), 3);
        assert_eq!(folder.len(), 2);
        assert!(folder.as_map().contains_key("b"));
    }

    #[test]
    fn folder_collects_from_iterator() {
        let folder: FragmentFolder = vec![
            fragment(json!({"a": {"x": 1}})),
            fragment(json!({"b": {"y": 2}})),
        ]
        .into_iter()
        .collect();
        assert_eq!(Value::Object(folder.finish()), json!({"a": {"x": 1}, "b": {"y": 2}}));
    }

    #[test]
    fn merge_values_on_scalars_replaces() {
        let mut acc = json!(1);
        merge_values(&mut acc, json!("two"));
        assert_eq!(acc, json!("two"));
    }

    /// Fragments shaped `{root: {sub: {attr: scalar}}}`, the shape producers
    /// emit. Roots and sub-keys come from small alphabets so collisions occur.
    fn arb_fragment() -> impl Strategy<Value = Fragment> {
        (
            "[a-c]",
            "[x-z]",
            prop::collection::btree_map("[p-s]", any::<i32>(), 0..3),
        )
            .prop_map(|(root, sub, attrs)| {
                let attrs: Map = attrs
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect();
                Fragment::single(root, sub, Value::Object(attrs))
            })
    }

    fn merge_chunked(fragments: &[Fragment], chunk: usize) -> Map {
        let mut acc = Value::Object(Map::new());
        for part in fragments.chunks(chunk) {
            merge_values(&mut acc, Value::Object(merge_fragments(part.to_vec())));
        }
        match acc {
            Value::Object(map) => map,
            _ => unreachable!("accumulator starts as an object"),
        }
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_result(
            fragments in prop::collection::vec(arb_fragment(), 0..12),
            chunk in 1usize..5,
        ) {
            let whole = merge_fragments(fragments.clone());
            prop_assert_eq!(merge_chunked(&fragments, chunk), whole);
        }

        #[test]
        fn disjoint_fragments_keep_every_root(
            roots in prop::collection::btree_set("[a-z]{1,4}", 0..8),
        ) {
            let fragments: Vec<Fragment> = roots
                .iter()
                .map(|root| Fragment::single(root.as_str(), "sub", Value::from(root.len())))
                .collect();
            let result = merge_fragments(fragments);
            prop_assert_eq!(result.len(), roots.len());
            for root in &roots {
                prop_assert_eq!(&result[root.as_str()]["sub"], &Value::from(root.len()));
            }
        }
    }
}

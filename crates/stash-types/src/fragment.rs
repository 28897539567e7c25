use crate::error::TypeError;
use crate::key::Key;
use crate::{Map, Value};

/// A single-root nested map: `{ root → { sub-key → attributes } }`.
///
/// Fragments are produced by one unit of external work (for example one
/// discovered resource) and folded together by the merge engine. Two
/// fragments may share a root; the merge resolves how their subtrees combine.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub root: Key,
    pub subtree: Map,
}

impl Fragment {
    /// Create a fragment with the given root and subtree.
    pub fn new(root: impl Into<Key>, subtree: Map) -> Self {
        Self {
            root: root.into(),
            subtree,
        }
    }

    /// Create a fragment whose root holds a single sub-key.
    pub fn single(root: impl Into<Key>, sub_key: impl Into<String>, attributes: Value) -> Self {
        let mut subtree = Map::new();
        subtree.insert(sub_key.into(), attributes);
        Self::new(root, subtree)
    }

    /// Convert into the `{ root: subtree }` object form.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(self.root.into_string(), Value::Object(self.subtree));
        Value::Object(map)
    }
}

impl TryFrom<Value> for Fragment {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(TypeError::InvalidFragment("expected an object".into()));
        };
        if map.len() != 1 {
            return Err(TypeError::InvalidFragment(format!(
                "expected exactly one root key, found {}",
                map.len()
            )));
        }
        let Some((root, subtree)) = map.into_iter().next() else {
            return Err(TypeError::InvalidFragment("missing root key".into()));
        };
        match subtree {
            Value::Object(subtree) => Ok(Self::new(root, subtree)),
            other => Err(TypeError::InvalidFragment(format!(
                "root {root:?} must map to an object, found {}",
                kind_name(&other)
            ))),
        }
    }
}

impl From<Fragment> for Value {
    fn from(fragment: Fragment) -> Self {
        fragment.into_value()
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

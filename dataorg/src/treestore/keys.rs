//! Key layout shared by the ordered key-value backends.
//!
//! A record is stored at
//! `len(doid) | doid | len(view) | view | arrived`, lengths as big-endian
//! u32 and `arrived` as big-endian u64. This keeps the records of one tree
//! in one contiguous range, sorted by `arrived`, and all trees of a digital
//! object below a common prefix.
use crate::nodes::DigitalObjectId;
use crate::proto::NodeRecord;
use crate::{Error, TreeId};

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// The prefix shared by all records of a digital object, over all views.
pub fn object_prefix(digital_object_id: &DigitalObjectId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + digital_object_id.as_str().len());
    push_str(&mut buf, digital_object_id.as_str());
    buf
}

/// The prefix shared by all records of one tree.
/// Also used as the key of the tree generation.
pub fn tree_prefix(tree: &TreeId) -> Vec<u8> {
    let mut buf = object_prefix(tree.digital_object_id());
    push_str(&mut buf, tree.view());
    buf
}

pub fn record_key(tree: &TreeId, arrived: u64) -> Vec<u8> {
    let mut buf = tree_prefix(tree);
    buf.extend_from_slice(&arrived.to_be_bytes());
    buf
}

/// The key a record is stored at.
pub fn key_of(record: &NodeRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + record.digital_object_id.len() + record.view.len());
    push_str(&mut buf, &record.digital_object_id);
    push_str(&mut buf, &record.view);
    buf.extend_from_slice(&record.arrived.to_be_bytes());
    buf
}

/// Returns the view name encoded in a record key of the given digital object.
pub fn view_of(key: &[u8], object_prefix: &[u8]) -> Result<String, Error> {
    let corrupted = || Error::StorageError(format!("corrupted record key {:x?}", key));

    let rest = key.strip_prefix(object_prefix).ok_or_else(corrupted)?;
    let (len, rest) = rest.split_first_chunk::<4>().ok_or_else(corrupted)?;
    let view = rest
        .get(..u32::from_be_bytes(*len) as usize)
        .ok_or_else(corrupted)?;

    String::from_utf8(view.to_vec()).map_err(|_| corrupted())
}

/// Decodes the stored value of a tree generation.
pub fn decode_generation(data: &[u8]) -> Result<u32, Error> {
    <[u8; 4]>::try_from(data)
        .map(u32::from_be_bytes)
        .map_err(|_| Error::StorageError("corrupted tree generation".to_string()))
}

/// The generation following `current`.
pub fn next_generation(current: u32) -> Result<u32, Error> {
    current
        .checked_add(1)
        .ok_or_else(|| Error::StorageError("tree generations exhausted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{key_of, object_prefix, record_key, tree_prefix, view_of};
    use crate::proto::NodeRecord;
    use crate::TreeId;

    #[test]
    fn keys_sort_by_arrived_within_a_tree() {
        let tree = TreeId::new("obj".into(), "default");
        let keys: Vec<_> = [0u64, 1, 255, 256, 70_000]
            .into_iter()
            .map(|a| record_key(&tree, a))
            .collect();

        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.iter().all(|k| k.starts_with(&tree_prefix(&tree))));
    }

    #[test]
    fn prefixes_do_not_overlap() {
        // without the length prefix "ab" would be below "a"
        let a = TreeId::new("a".into(), "default");
        let ab = TreeId::new("ab".into(), "default");
        assert!(!record_key(&ab, 0).starts_with(&tree_prefix(&a)));
        assert!(!record_key(&ab, 0).starts_with(&object_prefix(a.digital_object_id())));

        let v = TreeId::new("a".into(), "v");
        let vw = TreeId::new("a".into(), "vw");
        assert!(!record_key(&vw, 0).starts_with(&tree_prefix(&v)));
    }

    #[test]
    fn key_of_record_matches() {
        let record = NodeRecord {
            digital_object_id: "obj".into(),
            view: "custom".into(),
            arrived: 7,
            ..Default::default()
        };
        let tree = record.tree_id();
        let key = key_of(&record);

        assert_eq!(record_key(&tree, 7), key);
        assert_eq!(
            "custom",
            view_of(&key, &object_prefix(tree.digital_object_id())).unwrap()
        );
    }

    #[test]
    fn view_of_rejects_garbage() {
        let prefix = object_prefix(&"obj".into());
        assert!(view_of(b"nope", &prefix).is_err());

        let mut truncated = prefix.clone();
        truncated.extend_from_slice(&100u32.to_be_bytes());
        truncated.extend_from_slice(b"short");
        assert!(view_of(&truncated, &prefix).is_err());
    }
}

use lens_resolver::{Node, ResolvedObject};
use lens_types::{ContentTypeLabel, FieldValue, MetadataRecord};

/// Records a graph node's immediate links and its textual attributes.
///
/// Links are not followed; deep traversal happens in the resolver before
/// dispatch when a caller wants it.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphExtractor;

impl GraphExtractor {
    pub fn extract(&self, label: ContentTypeLabel, object: &ResolvedObject) -> MetadataRecord {
        let links = object.links();
        let total_link_size: u64 = links.iter().filter_map(|l| l.size).sum();

        let mut record = MetadataRecord::new(*object.identifier(), label)
            .with_field("link_count", links.len())
            .with_field(
                "links",
                FieldValue::List(links.iter().map(|l| FieldValue::from(l.target)).collect()),
            )
            .with_field(
                "link_names",
                FieldValue::List(
                    links
                        .iter()
                        .map(|l| FieldValue::from(l.name.as_deref().unwrap_or_default()))
                        .collect(),
                ),
            )
            .with_field("total_link_size", total_link_size);

        match object.node() {
            Node::Structured { attributes } => {
                for (key, value) in attributes {
                    record.insert(key.clone(), value.clone());
                }
            }
            Node::Pb { unixfs: Some(unixfs) } => {
                record.insert("unixfs_type", unixfs.kind.name());
                if let Some(size) = unixfs.file_size {
                    record.insert("size", size);
                }
            }
            Node::Pb { unixfs: None } | Node::Raw => {}
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_resolver::build_directory;
    use lens_types::{Codec, ContentIdentifier, HashFunction};

    fn id(codec: Codec, bytes: &[u8]) -> ContentIdentifier {
        ContentIdentifier::from_content(codec, HashFunction::Sha2_256, bytes).unwrap()
    }

    #[test]
    fn directory_links_are_listed() {
        let a = id(Codec::Raw, b"a");
        let b = id(Codec::Raw, b"b");
        let dag = build_directory(&[("a.txt".into(), a, 10), ("b.txt".into(), b, 32)]).unwrap();
        let (root, bytes) = dag.blocks[0].clone();
        let object = ResolvedObject::decode(root, bytes).unwrap();

        let record = GraphExtractor.extract(ContentTypeLabel::GraphNode, &object);
        assert_eq!(record.field("link_count").and_then(|v| v.as_integer()), Some(2));
        assert_eq!(
            record.field("links"),
            Some(&FieldValue::List(vec![FieldValue::from(a), FieldValue::from(b)]))
        );
        assert_eq!(
            record.field("link_names"),
            Some(&FieldValue::List(vec!["a.txt".into(), "b.txt".into()]))
        );
        assert_eq!(record.field("total_link_size").and_then(|v| v.as_integer()), Some(42));
        assert_eq!(record.field("unixfs_type").and_then(|v| v.as_text()), Some("directory"));
    }

    #[test]
    fn json_attributes_are_copied() {
        let child = id(Codec::Raw, b"child");
        let doc = format!(r#"{{"name": "photos", "size": 4096, "cover": {{"/": "{child}"}}}}"#);
        let object = ResolvedObject::decode(id(Codec::DagJson, doc.as_bytes()), doc.into_bytes()).unwrap();

        let record = GraphExtractor.extract(ContentTypeLabel::GraphNode, &object);
        assert_eq!(record.field("name").and_then(|v| v.as_text()), Some("photos"));
        assert_eq!(record.field("size").and_then(|v| v.as_integer()), Some(4096));
        assert_eq!(record.field("link_count").and_then(|v| v.as_integer()), Some(1));
        assert_eq!(
            record.field("link_names"),
            Some(&FieldValue::List(vec!["cover".into()]))
        );
        assert!(record.field("unixfs_type").is_none());
    }

    #[test]
    fn leaf_node_has_zero_links() {
        let object = ResolvedObject::decode(id(Codec::DagJson, b"{}"), b"{}".to_vec()).unwrap();
        let record = GraphExtractor.extract(ContentTypeLabel::GraphNode, &object);
        assert_eq!(record.field("link_count").and_then(|v| v.as_integer()), Some(0));
        assert_eq!(record.field("links"), Some(&FieldValue::List(vec![])));
    }
}

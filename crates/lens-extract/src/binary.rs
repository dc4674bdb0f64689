use lens_resolver::ResolvedObject;
use lens_types::{ContentTypeLabel, MetadataRecord};

/// Fallback extractor: records the content length and nothing else.
///
/// The digest is already part of the identifier, so it is not repeated.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryExtractor;

impl BinaryExtractor {
    pub fn extract(&self, label: ContentTypeLabel, object: &ResolvedObject) -> MetadataRecord {
        MetadataRecord::new(*object.identifier(), label)
            .with_field("byte_length", object.content().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_types::{Codec, ContentIdentifier, HashFunction};

    #[test]
    fn records_only_byte_length() {
        let bytes = vec![0u8, 1, 2, 3, 4];
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, &bytes).unwrap();
        let object = ResolvedObject::decode(id, bytes).unwrap();

        let record = BinaryExtractor.extract(ContentTypeLabel::Unknown, &object);
        assert_eq!(record.content_type(), ContentTypeLabel::Unknown);
        assert_eq!(record.source(), &id);
        assert_eq!(record.fields().len(), 1);
        assert_eq!(record.field("byte_length").and_then(|v| v.as_integer()), Some(5));
    }
}

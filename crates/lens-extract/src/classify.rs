//! Content classification.
//!
//! A pure function of the codec, the decoded node and the content bytes.
//! Graph codecs are labelled structurally; byte content is sniffed by magic
//! numbers and a few structural probes.

use lens_resolver::ResolvedObject;
use lens_types::{Codec, ContentTypeLabel};

/// Bytes inspected when looking for an HTML root element.
const HTML_PROBE_LEN: usize = 512;

/// Offset of the POSIX tar magic.
const TAR_MAGIC_OFFSET: usize = 257;

/// A recognized byte format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Pdf,
    Html,
    Markdown,
    Text,
    Gzip,
    Zip,
    Elf,
    Wasm,
    Zstd,
    SevenZip,
    Tar,
}

impl Format {
    pub fn label(&self) -> ContentTypeLabel {
        match self {
            Self::Png | Self::Jpeg | Self::Gif | Self::Webp | Self::Bmp | Self::Tiff => {
                ContentTypeLabel::Image
            }
            Self::Pdf | Self::Html | Self::Markdown | Self::Text => ContentTypeLabel::Document,
            Self::Gzip | Self::Zip | Self::Elf | Self::Wasm | Self::Zstd | Self::SevenZip | Self::Tar => {
                ContentTypeLabel::RawBinary
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Gzip => "gzip",
            Self::Zip => "zip",
            Self::Elf => "elf",
            Self::Wasm => "wasm",
            Self::Zstd => "zstd",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
        }
    }
}

/// Label a resolved object.
pub fn classify(object: &ResolvedObject) -> ContentTypeLabel {
    match object.codec() {
        Codec::DagJson | Codec::DagCbor => ContentTypeLabel::GraphNode,
        Codec::DagPb if !object.is_unixfs_file() => ContentTypeLabel::GraphNode,
        Codec::DagPb | Codec::Raw => classify_bytes(object.content()),
    }
}

/// Label raw content by sniffing.
pub fn classify_bytes(bytes: &[u8]) -> ContentTypeLabel {
    sniff(bytes).map_or(ContentTypeLabel::Unknown, |f| f.label())
}

/// Identify the format of `bytes`, if recognized.
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    if bytes.is_empty() {
        return None;
    }
    sniff_magic(bytes).or_else(|| sniff_text(bytes))
}

fn sniff_magic(b: &[u8]) -> Option<Format> {
    let format = if b.starts_with(b"\x89PNG\r\n\x1a\n") {
        Format::Png
    } else if b.starts_with(&[0xff, 0xd8, 0xff]) {
        Format::Jpeg
    } else if b.starts_with(b"GIF87a") || b.starts_with(b"GIF89a") {
        Format::Gif
    } else if b.len() >= 12 && b.starts_with(b"RIFF") && &b[8..12] == b"WEBP" {
        Format::Webp
    } else if is_bmp(b) {
        Format::Bmp
    } else if b.starts_with(b"II*\0") || b.starts_with(b"MM\0*") {
        Format::Tiff
    } else if b.starts_with(b"%PDF-") {
        Format::Pdf
    } else if b.starts_with(&[0x1f, 0x8b]) {
        Format::Gzip
    } else if b.starts_with(b"PK\x03\x04") || b.starts_with(b"PK\x05\x06") {
        Format::Zip
    } else if b.starts_with(b"\x7fELF") {
        Format::Elf
    } else if b.starts_with(b"\0asm") {
        Format::Wasm
    } else if b.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Format::Zstd
    } else if b.starts_with(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c]) {
        Format::SevenZip
    } else if b.len() >= TAR_MAGIC_OFFSET + 5 && &b[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar" {
        Format::Tar
    } else {
        return None;
    };
    Some(format)
}

/// "BM" alone is too weak; require a known DIB header size as well.
fn is_bmp(b: &[u8]) -> bool {
    if b.len() < 26 || !b.starts_with(b"BM") {
        return false;
    }
    let dib = u32::from_le_bytes([b[14], b[15], b[16], b[17]]);
    matches!(dib, 12 | 40 | 52 | 56 | 64 | 108 | 124)
}

fn sniff_text(b: &[u8]) -> Option<Format> {
    let text = std::str::from_utf8(b).ok()?;
    let clean = text
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t' | '\x0c'));
    if !clean {
        return None;
    }

    let probe: String = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(HTML_PROBE_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if probe.starts_with("<!doctype html") || probe.starts_with("<html") || probe.contains("<html") {
        return Some(Format::Html);
    }
    if markdown_heading(text).is_some() {
        return Some(Format::Markdown);
    }
    Some(Format::Text)
}

/// First ATX heading (`# Title` .. `###### Title`) in `text`.
pub(crate) fn markdown_heading(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let line = line.trim_start();
        let hashes = line.len() - line.trim_start_matches('#').len();
        if !(1..=6).contains(&hashes) {
            return None;
        }
        let rest = &line[hashes..];
        if !rest.starts_with(' ') {
            return None;
        }
        let title = rest.trim().trim_end_matches('#').trim_end();
        (!title.is_empty()).then_some(title)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_resolver::dagpb::{PbLink, PbNode, UnixFsData};
    use lens_types::{ContentIdentifier, HashFunction};

    fn object(codec: Codec, bytes: Vec<u8>) -> ResolvedObject {
        let id = ContentIdentifier::from_content(codec, HashFunction::Sha2_256, &bytes).unwrap();
        ResolvedObject::decode(id, bytes).unwrap()
    }

    #[test]
    fn images_are_recognized() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), Some(Format::Png));
        assert_eq!(sniff(&[0xff, 0xd8, 0xff, 0xe0]), Some(Format::Jpeg));
        assert_eq!(sniff(b"GIF89a\x01\0"), Some(Format::Gif));
        assert_eq!(sniff(b"RIFF\x10\0\0\0WEBPVP8 "), Some(Format::Webp));
        assert_eq!(sniff(b"II*\0\x08\0\0\0"), Some(Format::Tiff));

        let mut bmp = b"BM".to_vec();
        bmp.resize(14, 0);
        bmp.extend_from_slice(&40u32.to_le_bytes());
        bmp.resize(30, 0);
        assert_eq!(sniff(&bmp), Some(Format::Bmp));
    }

    #[test]
    fn bm_prefixed_text_is_not_bmp() {
        assert_eq!(sniff(b"BMW owners club newsletter, issue 4"), Some(Format::Text));
    }

    #[test]
    fn documents_are_recognized() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Some(Format::Pdf));
        assert_eq!(sniff(b"  <!DOCTYPE html><html></html>"), Some(Format::Html));
        assert_eq!(sniff(b"<?xml version=\"1.0\"?>\n<html>"), Some(Format::Html));
        assert_eq!(sniff(b"intro\n\n## Usage\nrun it"), Some(Format::Markdown));
        assert_eq!(sniff("plain ünïcode text\n".as_bytes()), Some(Format::Text));
    }

    #[test]
    fn binaries_are_recognized() {
        assert_eq!(sniff(&[0x1f, 0x8b, 0x08]), Some(Format::Gzip));
        assert_eq!(sniff(b"PK\x03\x04rest"), Some(Format::Zip));
        assert_eq!(sniff(b"\x7fELF\x02\x01"), Some(Format::Elf));
        assert_eq!(sniff(b"\0asm\x01\0\0\0"), Some(Format::Wasm));
        assert_eq!(sniff(&[0x28, 0xb5, 0x2f, 0xfd, 0]), Some(Format::Zstd));
        assert_eq!(sniff(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0]), Some(Format::SevenZip));

        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(sniff(&tar), Some(Format::Tar));
    }

    #[test]
    fn unrecognized_or_empty_is_unknown() {
        assert_eq!(classify_bytes(b""), ContentTypeLabel::Unknown);
        assert_eq!(classify_bytes(&[0x00, 0x01, 0x02, 0xfe]), ContentTypeLabel::Unknown);
        assert_eq!(classify_bytes(b"text with a \x07 bell"), ContentTypeLabel::Unknown);
    }

    #[test]
    fn structured_codecs_are_graph_nodes() {
        assert_eq!(classify(&object(Codec::DagJson, b"{}".to_vec())), ContentTypeLabel::GraphNode);
        // {}
        assert_eq!(classify(&object(Codec::DagCbor, vec![0xa0])), ContentTypeLabel::GraphNode);
    }

    #[test]
    fn pb_directories_are_graph_nodes_and_files_are_sniffed() {
        let child = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, b"c").unwrap();
        let dir = PbNode {
            links: vec![PbLink::new(child, Some("c".into()), Some(1))],
            data: Some(UnixFsData::directory().encode()),
        };
        assert_eq!(classify(&object(Codec::DagPb, dir.encode())), ContentTypeLabel::GraphNode);

        let bare = PbNode { links: vec![], data: None };
        assert_eq!(classify(&object(Codec::DagPb, bare.encode())), ContentTypeLabel::GraphNode);

        let file = PbNode {
            links: vec![],
            data: Some(UnixFsData::file(Some(b"%PDF-1.4".to_vec()), 8, vec![]).encode()),
        };
        assert_eq!(classify(&object(Codec::DagPb, file.encode())), ContentTypeLabel::Document);
    }

    #[test]
    fn raw_blocks_are_sniffed() {
        assert_eq!(classify(&object(Codec::Raw, b"GIF87a..".to_vec())), ContentTypeLabel::Image);
        assert_eq!(classify(&object(Codec::Raw, vec![0x1f, 0x8b])), ContentTypeLabel::RawBinary);
    }

    #[test]
    fn markdown_heading_levels() {
        assert_eq!(markdown_heading("# Title"), Some("Title"));
        assert_eq!(markdown_heading("text\n### Deep ###\n"), Some("Deep"));
        assert_eq!(markdown_heading("#hashtag"), None);
        assert_eq!(markdown_heading("####### seven"), None);
    }
}

//! Virtual extended attributes.
//!
//! The name server has no flat xattr list. We present one: a fixed catalog of
//! names whose reported length shrinks with the number of segments a file
//! actually has, so every name keeps the same offset in the listing. Values
//! are computed on demand from the status record and the segment records.

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::traits::{Backend, SegmentRecord};

pub const XATTR_STATUS: &str = "user.status";
pub const XATTR_NBSEG: &str = "user.nbseg";
pub const XATTR_CHECKSUM_NAME: &str = "user.checksum_name";
pub const XATTR_CHECKSUM: &str = "user.checksum";

/// Accepted spellings of the segment-1 pair besides the `user.` ones.
const ALIAS_CHECKSUM_NAME: &str = "castor.checksum_name";
const ALIAS_CHECKSUM: &str = "castor.checksum";

const SEGMENT_PREFIX: &str = "castor.seg";

/// Segments listed in the catalog.
pub const MAX_SEGMENTS: usize = 5;

/// Size answered to a zero-capacity `listxattr`.
pub const XATTR_LIST_SIZE_MAX: usize = 512;

/// Size answered to a zero-capacity `getxattr`.
pub const XATTR_VALUE_SIZE_MAX: usize = 65536;

/// Answer to an xattr query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrReply {
    /// Advisory buffer size for a zero-capacity probe.
    Size(usize),
    Data(Vec<u8>),
}

pub fn segment_checksum_name(segment: usize) -> String {
    format!("{}{}.checksum_name", SEGMENT_PREFIX, segment)
}

pub fn segment_checksum(segment: usize) -> String {
    format!("{}{}.checksum", SEGMENT_PREFIX, segment)
}

/// The canonical, NUL-separated attribute name list.
///
/// Built once before serving and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct AttributeCatalog {
    bytes: Vec<u8>,
    segment_span: usize,
    summary_span: usize,
}

impl AttributeCatalog {
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(XATTR_LIST_SIZE_MAX);
        for name in [XATTR_STATUS, XATTR_NBSEG, XATTR_CHECKSUM_NAME, XATTR_CHECKSUM] {
            push_name(&mut bytes, name);
        }

        let summary_span = XATTR_CHECKSUM_NAME.len() + XATTR_CHECKSUM.len() + 2;

        let mut segment_span = 0;
        for segment in 1..=MAX_SEGMENTS {
            let name = segment_checksum_name(segment);
            let value = segment_checksum(segment);
            if segment == 1 {
                segment_span = name.len() + value.len() + 2;
            }
            push_name(&mut bytes, &name);
            push_name(&mut bytes, &value);
        }

        AttributeCatalog {
            bytes,
            segment_span,
            summary_span,
        }
    }

    /// The full serialized catalog.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes contributed by one segment's pair of names.
    pub fn segment_span(&self) -> usize {
        self.segment_span
    }

    /// Bytes of the generic checksum-name/checksum pair.
    pub fn summary_span(&self) -> usize {
        self.summary_span
    }

    /// Listing length for a file with `segments` segments.
    ///
    /// Counts above [`MAX_SEGMENTS`] are clamped.
    pub fn reported_len(&self, segments: usize) -> usize {
        let segments = segments.min(MAX_SEGMENTS);
        let mut len = self.bytes.len() - (MAX_SEGMENTS - segments) * self.segment_span;
        if segments == 0 {
            len -= self.summary_span;
        }
        len
    }

    /// The listing handed to a caller for a file with `segments` segments.
    pub fn listing(&self, segments: usize) -> &[u8] {
        &self.bytes[..self.reported_len(segments)]
    }

    /// Attribute names, in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bytes
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .filter_map(|name| std::str::from_utf8(name).ok())
    }
}

impl Default for AttributeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn push_name(bytes: &mut Vec<u8>, name: &str) {
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
}

/// A recognized virtual attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualAttr {
    Status,
    SegmentCount,
    /// Checksum algorithm of the 1-based segment.
    ChecksumName(usize),
    /// Checksum value of the 1-based segment.
    Checksum(usize),
    /// Anything else. Answers with an empty value.
    Unrecognized,
}

impl VirtualAttr {
    pub fn parse(name: &str) -> Self {
        match name {
            XATTR_STATUS => return VirtualAttr::Status,
            XATTR_NBSEG => return VirtualAttr::SegmentCount,
            XATTR_CHECKSUM_NAME | ALIAS_CHECKSUM_NAME => return VirtualAttr::ChecksumName(1),
            XATTR_CHECKSUM | ALIAS_CHECKSUM => return VirtualAttr::Checksum(1),
            _ => {}
        }

        let Some((index, field)) = name
            .strip_prefix(SEGMENT_PREFIX)
            .and_then(|rest| rest.split_once('.'))
        else {
            return VirtualAttr::Unrecognized;
        };

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return VirtualAttr::Unrecognized;
        }
        let segment = match index.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => return VirtualAttr::Unrecognized,
        };

        match field {
            "checksum_name" => VirtualAttr::ChecksumName(segment),
            "checksum" => VirtualAttr::Checksum(segment),
            _ => VirtualAttr::Unrecognized,
        }
    }

    /// Whether the value comes from the segment records.
    pub fn needs_segments(&self) -> bool {
        matches!(
            self,
            VirtualAttr::SegmentCount | VirtualAttr::ChecksumName(_) | VirtualAttr::Checksum(_)
        )
    }

    /// Value computed from the segment records. Missing segments give an
    /// empty value.
    pub fn segment_value(&self, segments: &[SegmentRecord]) -> String {
        match self {
            VirtualAttr::SegmentCount => segments.len().to_string(),
            VirtualAttr::ChecksumName(n) => n
                .checked_sub(1)
                .and_then(|i| segments.get(i))
                .map(|seg| seg.checksum_name.clone())
                .unwrap_or_default(),
            VirtualAttr::Checksum(n) => n
                .checked_sub(1)
                .and_then(|i| segments.get(i))
                .map(|seg| seg.checksum.to_string())
                .unwrap_or_default(),
            VirtualAttr::Status | VirtualAttr::Unrecognized => String::new(),
        }
    }
}

/// `listxattr` on an absolute namespace path.
pub async fn list(
    backend: &dyn Backend,
    catalog: &AttributeCatalog,
    path: &str,
    capacity: usize,
) -> FsResult<XattrReply> {
    if capacity == 0 {
        return Ok(XattrReply::Size(XATTR_LIST_SIZE_MAX));
    }

    let segments = backend.segments(path).await?.len();
    let listing = catalog.listing(segments);
    debug!(path, segments, len = listing.len(), "listxattr");

    if listing.len() > capacity {
        return Err(FsError::Range {
            needed: listing.len(),
            capacity,
        });
    }
    Ok(XattrReply::Data(listing.to_vec()))
}

/// `getxattr` on an absolute namespace path.
pub async fn get(
    backend: &dyn Backend,
    path: &str,
    name: &str,
    capacity: usize,
) -> FsResult<XattrReply> {
    if capacity == 0 {
        return Ok(XattrReply::Size(XATTR_VALUE_SIZE_MAX));
    }

    let stat = backend.stat(path).await?;
    let attr = VirtualAttr::parse(name);

    let value = match attr {
        VirtualAttr::Status => stat.status.as_str().to_string(),
        attr if attr.needs_segments() => {
            let segments = backend.segments(path).await?;
            attr.segment_value(&segments)
        }
        _ => String::new(),
    };
    debug!(path, name, ?attr, value = %value, "getxattr");

    if value.len() > capacity {
        return Err(FsError::Range {
            needed: value.len(),
            capacity,
        });
    }
    Ok(XattrReply::Data(value.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_layout() {
        let catalog = AttributeCatalog::new();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names.len(), 4 + 2 * MAX_SEGMENTS);
        assert_eq!(
            &names[..6],
            &[
                "user.status",
                "user.nbseg",
                "user.checksum_name",
                "user.checksum",
                "castor.seg1.checksum_name",
                "castor.seg1.checksum",
            ]
        );
        assert_eq!(names.last(), Some(&"castor.seg5.checksum"));
        assert!(catalog.len() <= XATTR_LIST_SIZE_MAX);
        assert_eq!(catalog.as_bytes().last(), Some(&0));
    }

    #[test]
    fn test_catalog_spans() {
        let catalog = AttributeCatalog::new();
        assert_eq!(
            catalog.segment_span(),
            "castor.seg1.checksum_name".len() + 1 + "castor.seg1.checksum".len() + 1
        );
        assert_eq!(
            catalog.summary_span(),
            "user.checksum_name".len() + 1 + "user.checksum".len() + 1
        );
    }

    #[test]
    fn test_reported_len_identity() {
        let catalog = AttributeCatalog::new();
        for n in 0..=MAX_SEGMENTS {
            let mut expected = catalog.len() - (MAX_SEGMENTS - n) * catalog.segment_span();
            if n == 0 {
                expected -= catalog.summary_span();
            }
            assert_eq!(catalog.reported_len(n), expected, "segments = {}", n);
        }
    }

    #[test]
    fn test_listing_ends_on_name_boundary() {
        let catalog = AttributeCatalog::new();
        for n in 0..=MAX_SEGMENTS {
            let listing = catalog.listing(n);
            assert_eq!(listing.last(), Some(&0));
            let names = listing.split(|&b| b == 0).filter(|s| !s.is_empty()).count();
            let expected = if n == 0 { 2 } else { 4 + 2 * n };
            assert_eq!(names, expected, "segments = {}", n);
        }
    }

    #[test]
    fn test_reported_len_clamps() {
        let catalog = AttributeCatalog::new();
        assert_eq!(catalog.reported_len(MAX_SEGMENTS + 3), catalog.len());
    }

    #[test]
    fn test_parse_fixed_names() {
        assert_eq!(VirtualAttr::parse("user.status"), VirtualAttr::Status);
        assert_eq!(VirtualAttr::parse("user.nbseg"), VirtualAttr::SegmentCount);
        assert_eq!(VirtualAttr::parse("user.checksum_name"), VirtualAttr::ChecksumName(1));
        assert_eq!(VirtualAttr::parse("user.checksum"), VirtualAttr::Checksum(1));
        assert_eq!(VirtualAttr::parse("castor.checksum_name"), VirtualAttr::ChecksumName(1));
        assert_eq!(VirtualAttr::parse("castor.checksum"), VirtualAttr::Checksum(1));
    }

    #[test]
    fn test_parse_segment_names() {
        assert_eq!(
            VirtualAttr::parse("castor.seg2.checksum_name"),
            VirtualAttr::ChecksumName(2)
        );
        assert_eq!(VirtualAttr::parse("castor.seg12.checksum"), VirtualAttr::Checksum(12));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for name in [
            "castor.seg0.checksum",
            "castor.seg.checksum",
            "castor.seg+1.checksum",
            "castor.seg1.size",
            "castor.seg1",
            "user.checksum2",
            "user.mime_type",
            "",
        ] {
            assert_eq!(VirtualAttr::parse(name), VirtualAttr::Unrecognized, "{}", name);
        }
    }

    #[test]
    fn test_segment_values() {
        let segments = vec![
            SegmentRecord::new("adler32", 12345),
            SegmentRecord::new("md5", 67890),
        ];
        assert_eq!(VirtualAttr::SegmentCount.segment_value(&segments), "2");
        assert_eq!(VirtualAttr::ChecksumName(1).segment_value(&segments), "adler32");
        assert_eq!(VirtualAttr::Checksum(2).segment_value(&segments), "67890");
        assert_eq!(VirtualAttr::Checksum(3).segment_value(&segments), "");
        assert_eq!(VirtualAttr::SegmentCount.segment_value(&[]), "0");
    }

    #[test]
    fn test_segment_zero_is_empty() {
        let segments = vec![SegmentRecord::new("adler32", 12345)];
        assert_eq!(VirtualAttr::ChecksumName(0).segment_value(&segments), "");
        assert_eq!(VirtualAttr::Checksum(0).segment_value(&segments), "");
    }
}

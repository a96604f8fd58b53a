//! Container image records and the listing wire format.

use anyhow::Context;

/// A container image as reported by a host's image store.
///
/// Immutable once constructed; the image is implicitly tied to the host whose
/// endpoint produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    name: String,
    size_bytes: u64,
    id: String,
}

impl Image {
    pub fn new(name: impl Into<String>, size_bytes: u64, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            id: id.into(),
        }
    }

    /// Image name in `repo:tag` form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes as reported by the host.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Content identifier reported by the host.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable size for logs and listings.
    pub fn size_display(&self) -> String {
        bytesize::ByteSize(self.size_bytes).to_string()
    }

    /// File name used when saving this image to disk: `:` and `/` are not
    /// portable in file names and are replaced with `_`.
    pub fn archive_file_name(&self) -> String {
        format!("{}.tar.gz", self.name.replace([':', '/'], "_"))
    }
}

// suffixes are checked in this order; "KB" must win over "B"
const SIZE_SUFFIXES: [(&str, u64); 4] = [
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("B", 1),
];

/// Parse a size string with an optional unit suffix into bytes.
///
/// Units use binary multiples (1 GB = 2^30). A bare numeric string parses as
/// bytes directly.
pub fn parse_size(size: &str) -> anyhow::Result<u64> {
    let size = size.trim();
    for (suffix, factor) in SIZE_SUFFIXES {
        if let Some(number) = size.strip_suffix(suffix) {
            let value = number
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid image size {size:?}"))?;
            return Ok((value * factor as f64) as u64);
        }
    }
    let value = size
        .parse::<f64>()
        .with_context(|| format!("unrecognized image size {size:?}"))?;
    Ok(value as u64)
}

#[derive(Debug, serde::Deserialize)]
struct ListingRecord {
    #[serde(rename = "Repository")]
    repository: String,
    #[serde(rename = "Tag")]
    tag: String,
    #[serde(rename = "Size")]
    size: String,
    #[serde(rename = "ID")]
    id: String,
}

/// Parse an image listing: one JSON object per line with `Repository`, `Tag`,
/// `Size` and `ID` fields. Blank lines are skipped; listing order is
/// whatever the host produced.
pub fn parse_image_listing(data: &str) -> anyhow::Result<Vec<Image>> {
    let mut images = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ListingRecord = serde_json::from_str(line)
            .with_context(|| format!("malformed image listing line: {line:?}"))?;
        let size_bytes = parse_size(&record.size)?;
        images.push(Image::new(
            format!("{}:{}", record.repository, record.tag),
            size_bytes,
            record.id,
        ));
    }
    Ok(images)
}

//! Image file classification by extension
//!
//! Directory listings over SFTP only give us names and attributes, so
//! classification has to work from the filename alone. Matching is
//! case-insensitive on the final extension.

/// MIME type returned for names outside the recognized set
pub const FALLBACK_MIME: &str = "image/jpeg";

/// Image formats recognized by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Tiff,
    Svg,
}

impl ImageFormat {
    /// All recognized formats
    pub const ALL: [ImageFormat; 7] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Webp,
        ImageFormat::Tiff,
        ImageFormat::Svg,
    ];

    /// Look up a format from a bare extension (no leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "webp" => Some(ImageFormat::Webp),
            "tiff" | "tif" => Some(ImageFormat::Tiff),
            "svg" => Some(ImageFormat::Svg),
            _ => None,
        }
    }

    /// Look up a format from a filename or full path
    pub fn from_path(name: &str) -> Option<Self> {
        extension(name).and_then(Self::from_extension)
    }

    /// Canonical MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    /// Lowercase extensions that map to this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg"],
            ImageFormat::Png => &["png"],
            ImageFormat::Gif => &["gif"],
            ImageFormat::Bmp => &["bmp"],
            ImageFormat::Webp => &["webp"],
            ImageFormat::Tiff => &["tiff", "tif"],
            ImageFormat::Svg => &["svg"],
        }
    }
}

/// Text after the last `.` of the final path component
///
/// A leading dot counts, so `.png` has extension `png`.
fn extension(name: &str) -> Option<&str> {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name.rfind('.').map(|idx| &file_name[idx + 1..])
}

/// Check whether a filename has a recognized image extension
///
/// ```
/// use sftp_image_server::content::is_image;
///
/// assert!(is_image("photo.JPG"));
/// assert!(!is_image("notes.txt"));
/// assert!(!is_image("README"));
/// ```
pub fn is_image(name: &str) -> bool {
    ImageFormat::from_path(name).is_some()
}

/// MIME type for a filename, falling back to `image/jpeg`
pub fn content_type(name: &str) -> &'static str {
    ImageFormat::from_path(name)
        .map(|format| format.mime_type())
        .unwrap_or(FALLBACK_MIME)
}

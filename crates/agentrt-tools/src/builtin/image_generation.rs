// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::{ContentBlock, ToolResult};
use crate::tool::{Tool, ToolCall};

const MAX_COUNT: u64 = 4;

/// Generates placeholder image artifacts under `generated_images/` and
/// surfaces them as multimodal content. The concrete image-generation
/// backend is out of scope; this tool owns naming, persistence, and the
/// `ToolResult`/`llm_content` contract a real backend would plug into.
pub struct ImageGenerationTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ImageGenerationTool {
    fn name(&self) -> &str {
        "image_generation"
    }

    fn description(&self) -> &str {
        "Generates one or more images from a text prompt and persists them under \
         generated_images/. Returns sandbox:// references as multimodal content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "Description of the image to generate" },
                "count": { "type": "integer", "description": "Number of images to generate (default 1, max 4)" }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolResult::err("image_generation", "missing required parameter 'prompt'"),
        };
        let count = call.args.get("count").and_then(|v| v.as_u64()).unwrap_or(1).clamp(1, MAX_COUNT);

        debug!(prompt = %prompt, count, "image_generation tool");

        let dir = self.workspace_root.join("generated_images");
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return ToolResult::err("image_generation", format!("failed to create generated_images/: {e}"));
        }

        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let mut paths = Vec::new();
        let mut blocks = Vec::new();
        for idx in 0..count {
            let mut hasher = Sha256::new();
            hasher.update(prompt.as_bytes());
            hasher.update(epoch_ms.to_le_bytes());
            hasher.update(idx.to_le_bytes());
            let digest = hasher.finalize();
            let short = hex::encode(&digest[..4]);

            let filename = format!("{epoch_ms}_{short}_{idx}.png");
            let path = dir.join(&filename);
            if let Err(e) = tokio::fs::write(&path, placeholder_png()).await {
                return ToolResult::err("image_generation", format!("failed to write {filename}: {e}"));
            }

            let rel = PathBuf::from("generated_images").join(&filename);
            let url = crate::media::sandbox_url(&rel);
            paths.push(url.clone());
            blocks.push(ContentBlock::Text { text: format!("Generated image: {url}") });
            blocks.push(ContentBlock::Image { image_url: url });
        }

        ToolResult::ok_with_data(
            "image_generation",
            format!("generated {} image(s) for prompt: {prompt}", paths.len()),
            json!({ "paths": paths }),
        )
        .with_llm_content(blocks)
    }
}

/// Minimal valid 1x1 transparent PNG, used as a deterministic placeholder
/// artifact since no concrete generation backend is wired up.
fn placeholder_png() -> &'static [u8] {
    &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(root: &std::path::Path) -> ImageGenerationTool {
        ImageGenerationTool { workspace_root: root.to_path_buf() }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "i1".into(), name: "image_generation".into(), args }
    }

    #[tokio::test]
    async fn generates_single_image_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({"prompt": "a red circle"}))).await;
        assert!(out.success, "{:?}", out.error);
        let paths = out.data.unwrap()["paths"].as_array().unwrap().len();
        assert_eq!(paths, 1);
        assert_eq!(out.llm_content.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn respects_count_and_caps_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({"prompt": "x", "count": 10}))).await;
        assert_eq!(out.data.unwrap()["paths"].as_array().unwrap().len(), MAX_COUNT as usize);
    }

    #[tokio::test]
    async fn writes_files_under_generated_images_dir() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        t.arun(&call(json!({"prompt": "x"}))).await;
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("generated_images")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_prompt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({}))).await;
        assert!(!out.success);
    }
}

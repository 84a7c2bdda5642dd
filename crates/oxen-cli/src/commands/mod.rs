//! Shared helpers used by multiple oxen-cli command paths.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;

/// Load a job body from either an inline JSON string or a file path.
pub fn load_body(body: Option<String>, body_file: Option<String>) -> Result<Value> {
    if let Some(p) = body_file {
        let bytes = fs::read(&p).with_context(|| format!("read --body-file failed: {p}"))?;
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        let raw = String::from_utf8(bytes.to_vec()).context("--body-file must be UTF-8 text")?;
        let v: Value =
            serde_json::from_str(raw.trim()).context("--body-file must contain valid JSON")?;
        return Ok(v);
    }

    let raw = body.context("must provide --body or --body-file")?;
    let v: Value = serde_json::from_str(raw.trim()).context("--body must be valid JSON")?;
    Ok(v)
}

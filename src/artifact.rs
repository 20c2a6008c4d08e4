//! Fallback artifact writer.
//!
//! When the remote artifact write fails, the summary is persisted locally as
//! markdown so generated content is never lost. The item still completes,
//! carrying a local-only artifact reference.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::model::Metadata;

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Create the writer, ensuring the target directory exists.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write a local markdown artifact. Succeeds or fails with an I/O error;
    /// there is no further fallback below this one.
    pub fn write_local(&self, metadata: &Metadata, summary: &str) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!(
            "{timestamp}_{}_{}.md",
            sanitize_filename(&metadata.title),
            metadata.id
        );
        let path = self.dir.join(filename);

        std::fs::write(&path, render_markdown(metadata, summary))?;
        info!(path = %path.display(), "local fallback artifact written");
        Ok(path)
    }

    /// Existing artifacts, newest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();
        paths.reverse();
        Ok(paths)
    }
}

/// Replace filesystem-hostile characters and cap the length.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    cleaned.chars().take(100).collect()
}

fn render_markdown(metadata: &Metadata, summary: &str) -> String {
    let published = metadata
        .published_at
        .map(|t| t.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let mut content = format!(
        "# {}\n\n\
         ## Item Information\n\n\
         - **Item ID:** {}\n\
         - **Channel:** {}\n\
         - **Published:** {}\n\
         - **Source:** [{}]({})\n\
         - **Written:** {}\n\n\
         ## Summary\n\n{}\n",
        metadata.title,
        metadata.id,
        metadata.channel.as_deref().unwrap_or("Unknown"),
        published,
        metadata.source_url,
        metadata.source_url,
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        summary,
    );

    if let Some(ref description) = metadata.description {
        let truncated: String = description.chars().take(500).collect();
        content.push_str(&format!("\n## Description\n\n{truncated}\n"));
    }

    content.push_str("\n---\n\n*Written locally because the remote artifact write failed.*\n");
    content
}

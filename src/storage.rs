//! # Result Persistence
//!
//! Writes a transcript+summary pair as a plain-text artifact into a
//! category-scoped directory. This is the only part of the system with a
//! durable side effect, and it runs only as a separate, caller-triggered
//! step after the pipeline has succeeded.
//!
//! ## Artifact Format (UTF-8):
//! ```text
//! # Transcribed Text:
//! <transcript, trimmed>
//!
//! # Summary:
//! <summary, trimmed>
//! ```
//!
//! ## Directory Layout:
//! `<output_root>/uploads/` and `<output_root>/recordings/`, both created
//! at startup. Filenames are `<sanitized-base>_<YYYYMMDD_HHMMSS>.txt`;
//! the second-resolution timestamp keeps names unique in practice. Two
//! saves inside the same second may overwrite each other - a documented
//! limitation, not something this module guards against.

use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Base name used when the client sends no usable name at all.
const DEFAULT_BASE_NAME: &str = "audio_output";

/// Body of a save request.
///
/// `name` and `type` are optional with fixed defaults; `text` and
/// `summary` are validated before anything touches the disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRequest {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub summary: String,

    #[serde(rename = "type", default)]
    pub category: ArtifactCategory,
}

fn default_name() -> String {
    DEFAULT_BASE_NAME.to_string()
}

/// Which category root an artifact lands in.
///
/// Any unrecognized value deserializes to `Upload` - a fixed, unambiguous
/// default rather than a silent passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactCategory {
    #[default]
    Upload,
    Recording,
}

impl ArtifactCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactCategory::Upload => "uploads",
            ArtifactCategory::Recording => "recordings",
        }
    }
}

impl<'de> Deserialize<'de> for ArtifactCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "recording" => ArtifactCategory::Recording,
            _ => ArtifactCategory::Upload,
        })
    }
}

/// A persisted artifact. Created exactly once per successful save and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub category: ArtifactCategory,
    pub file_name: String,
    pub path: PathBuf,
}

/// Validates save requests and writes artifacts under the output root.
pub struct ResultPersister {
    uploads_dir: PathBuf,
    recordings_dir: PathBuf,
}

impl ResultPersister {
    pub fn new(output_root: &Path) -> Self {
        Self {
            uploads_dir: output_root.join(ArtifactCategory::Upload.dir_name()),
            recordings_dir: output_root.join(ArtifactCategory::Recording.dir_name()),
        }
    }

    /// Create both category directories; called once at startup.
    pub fn ensure_directories(&self) -> AppResult<()> {
        std::fs::create_dir_all(&self.uploads_dir)?;
        std::fs::create_dir_all(&self.recordings_dir)?;
        Ok(())
    }

    /// Validate and write one artifact.
    ///
    /// ## Process:
    /// 1. Reject the request unless both `text` and `summary` are non-empty
    /// 2. Sanitize the client name down to a safe base (final path segment,
    ///    extension stripped) so traversal attempts cannot escape the root
    /// 3. Stamp the filename with the current second
    /// 4. Write the two-section layout in one shot
    ///
    /// No partial artifact is ever written: validation happens before the
    /// file is created, and the contents are a single write call.
    pub fn save(&self, request: &SaveRequest) -> AppResult<SavedArtifact> {
        if request.text.is_empty() || request.summary.is_empty() {
            return Err(AppError::ValidationFailure(
                "Missing text or summary".to_string(),
            ));
        }

        let base_name = sanitize_base_name(&request.name);
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_name = format!("{}_{}.txt", base_name, timestamp);

        let dir = match request.category {
            ArtifactCategory::Upload => &self.uploads_dir,
            ArtifactCategory::Recording => &self.recordings_dir,
        };
        let path = dir.join(&file_name);

        let contents = format!(
            "# Transcribed Text:\n{}\n\n# Summary:\n{}",
            request.text.trim(),
            request.summary.trim()
        );

        std::fs::write(&path, contents)
            .map_err(|e| AppError::PersistenceFailure(format!("{}: {}", path.display(), e)))?;

        tracing::info!(
            path = %path.display(),
            category = request.category.dir_name(),
            "Artifact saved"
        );

        Ok(SavedArtifact {
            category: request.category,
            file_name,
            path,
        })
    }
}

/// Reduce a client-supplied name to a safe filename base.
///
/// Keeps only the final path segment (either separator style), drops the
/// extension, and falls back to the default base when nothing usable
/// remains - so `../../etc/passwd` becomes `passwd`, never a path.
fn sanitize_base_name(name: &str) -> String {
    let last_segment = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(DEFAULT_BASE_NAME)
        .trim();

    let base = match last_segment {
        "" | "." | ".." => "",
        segment => Path::new(segment)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(""),
    };

    if base.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn persister() -> (TempDir, ResultPersister) {
        let root = TempDir::new().unwrap();
        let persister = ResultPersister::new(root.path());
        persister.ensure_directories().unwrap();
        (root, persister)
    }

    fn request(name: &str, text: &str, summary: &str, category: &str) -> SaveRequest {
        serde_json::from_str(&format!(
            r#"{{"name": "{}", "text": "{}", "summary": "{}", "type": "{}"}}"#,
            name, text, summary, category
        ))
        .unwrap()
    }

    #[test]
    fn test_save_writes_exact_two_section_layout() {
        let (root, persister) = persister();
        let artifact = persister
            .save(&request("demo", "hello world", "hello", "upload"))
            .unwrap();

        assert!(artifact.file_name.starts_with("demo_"));
        assert!(artifact.file_name.ends_with(".txt"));
        assert!(artifact.path.starts_with(root.path().join("uploads")));

        let contents = std::fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(contents, "# Transcribed Text:\nhello world\n\n# Summary:\nhello");
    }

    #[test]
    fn test_recording_goes_to_recordings_root_only() {
        let (root, persister) = persister();
        let artifact = persister
            .save(&request("memo", "text", "summary", "recording"))
            .unwrap();

        assert!(artifact.path.starts_with(root.path().join("recordings")));
        assert!(!artifact.path.starts_with(root.path().join("uploads")));

        let uploads: Vec<_> = std::fs::read_dir(root.path().join("uploads"))
            .unwrap()
            .collect();
        assert!(uploads.is_empty());
    }

    #[test]
    fn test_unrecognized_type_defaults_to_upload() {
        let (root, persister) = persister();
        let artifact = persister
            .save(&request("memo", "text", "summary", "voicemail"))
            .unwrap();

        assert_eq!(artifact.category, ArtifactCategory::Upload);
        assert!(artifact.path.starts_with(root.path().join("uploads")));
    }

    #[test]
    fn test_missing_summary_is_rejected_and_writes_nothing() {
        let (root, persister) = persister();
        let body: SaveRequest =
            serde_json::from_str(r#"{"name": "demo", "text": "hello world"}"#).unwrap();

        let result = persister.save(&body);
        assert!(matches!(result, Err(AppError::ValidationFailure(_))));

        for dir in ["uploads", "recordings"] {
            let entries: Vec<_> = std::fs::read_dir(root.path().join(dir)).unwrap().collect();
            assert!(entries.is_empty(), "{} should stay empty", dir);
        }
    }

    #[test]
    fn test_traversal_name_stays_inside_target_root() {
        let (root, persister) = persister();
        let artifact = persister
            .save(&request("../../etc/passwd", "text", "summary", "upload"))
            .unwrap();

        assert!(artifact.file_name.starts_with("passwd_"));
        let canonical = artifact.path.canonicalize().unwrap();
        let uploads_root = root.path().join("uploads").canonicalize().unwrap();
        assert!(canonical.starts_with(&uploads_root));
    }

    #[test]
    fn test_defaults_apply_for_missing_name_and_type() {
        let (_root, persister) = persister();
        let body: SaveRequest =
            serde_json::from_str(r#"{"text": "some text", "summary": "short"}"#).unwrap();

        let artifact = persister.save(&body).unwrap();
        assert!(artifact.file_name.starts_with("audio_output_"));
        assert_eq!(artifact.category, ArtifactCategory::Upload);
    }

    #[test]
    fn test_extension_is_stripped_from_name() {
        let (_root, persister) = persister();
        let artifact = persister
            .save(&request("meeting.mp3", "text", "summary", "upload"))
            .unwrap();

        assert!(artifact.file_name.starts_with("meeting_"));
        assert!(!artifact.file_name.contains(".mp3"));
    }

    #[test]
    fn test_sanitize_base_name_edge_cases() {
        assert_eq!(sanitize_base_name("demo"), "demo");
        assert_eq!(sanitize_base_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_base_name("..\\..\\boot.ini"), "boot");
        assert_eq!(sanitize_base_name(".."), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name(""), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name("a/b/c.txt"), "c");
    }
}

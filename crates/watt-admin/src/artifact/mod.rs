//! Self-contained HTML recordings.
//!
//! The dashboard's own build output doubles as the artifact template: the
//! recorded payload is embedded as `window.LOADED_JSON` and the fonts are
//! inlined so the file renders offline.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

mod open;

#[cfg(test)]
pub(crate) use open::CountingOpener;
pub use open::{ArtifactOpener, SystemOpener};

pub const ARTIFACT_EXTENSION: &str = "html";
const FILENAME_PREFIX: &str = "watt-admin";
const TEMPLATE_FILE: &str = "index.html";

/// Font files under `<assets>/fonts`, as referenced by the template.
const FONTS: [&str; 2] = [
    "Inter/Inter-VariableFont_wght.ttf",
    "Roboto_Mono/RobotoMono-VariableFont_wght.ttf",
];

static FONT_PRELOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link rel="preload"[^>]*\.ttf"[^>]*>"#).expect("font preload pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("reading artifact template {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoding recording payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("writing recording to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Renders payloads into the template and writes them without overwriting.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    assets_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactBuilder {
    pub fn new(assets_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub async fn render(&self, payload_json: &str) -> Result<String, ArtifactError> {
        let template_path = self.assets_dir.join(TEMPLATE_FILE);
        let template = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(|source| ArtifactError::Template {
                path: template_path,
                source,
            })?;
        let html = strip_font_preloads(&template);
        let html = inline_fonts(html, &self.assets_dir.join("fonts")).await;
        Ok(inject_payload(&html, payload_json))
    }

    /// Encodes `payload`, renders it and writes it to a fresh path derived
    /// from `output_path`. Returns the path written.
    pub async fn write<T>(
        &self,
        payload: &T,
        output_path: Option<&str>,
    ) -> Result<PathBuf, ArtifactError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(payload)?;
        let html = self.render(&json).await?;

        let target = resolve_path(
            output_path,
            &self.output_dir,
            &default_filename(Utc::now()),
        );
        let path = unique_path(&target)
            .await
            .map_err(|source| ArtifactError::Write {
                path: target.clone(),
                source,
            })?;
        tokio::fs::write(&path, html)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "recording saved");
        Ok(path)
    }
}

/// Puts the payload in a script element right before `</body>`.
pub fn inject_payload(html: &str, payload_json: &str) -> String {
    let script = format!(
        "  <script>window.LOADED_JSON={}</script>\n",
        payload_json.replace("</", "<\\/")
    );
    match html.find("</body>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..at]);
            out.push_str(&script);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{html}{script}"),
    }
}

pub fn strip_font_preloads(html: &str) -> String {
    FONT_PRELOAD.replace_all(html, "").into_owned()
}

/// Swaps each `./fonts/...` reference for a base64 data URI. A font that
/// cannot be read keeps its original reference.
pub async fn inline_fonts(mut html: String, fonts_dir: &Path) -> String {
    for font in FONTS {
        let source = fonts_dir.join(font);
        match tokio::fs::read(&source).await {
            Ok(bytes) => {
                let data_uri = format!("data:font/ttf;base64,{}", STANDARD.encode(bytes));
                html = html.replace(&format!("./fonts/{font}"), &data_uri);
            }
            Err(e) => warn!(font, %e, "failed to inline font"),
        }
    }
    html
}

/// An explicit `.html` path is used as-is; any other explicit path is a
/// directory that receives `default_name`.
pub fn resolve_path(explicit: Option<&str>, default_dir: &Path, default_name: &str) -> PathBuf {
    match explicit {
        Some(path) if path.ends_with(&format!(".{ARTIFACT_EXTENSION}")) => PathBuf::from(path),
        Some(dir) => Path::new(dir).join(default_name),
        None => default_dir.join(default_name),
    }
}

/// `candidate` if free, else the first free `<stem>-N.<ext>` for N = 1, 2, …
///
/// Check-then-write; callers rely on there being a single writer at a time.
pub async fn unique_path(candidate: &Path) -> io::Result<PathBuf> {
    if !tokio::fs::try_exists(candidate).await? {
        return Ok(candidate.to_path_buf());
    }
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut counter: u32 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };
        let next = candidate.with_file_name(name);
        if !tokio::fs::try_exists(&next).await? {
            return Ok(next);
        }
        counter += 1;
    }
}

/// `watt-admin-YYYY-MM-DD-HH-MM-SS.html`, second precision, always in UTC
/// so names sort by creation time across offset changes.
pub fn default_filename<Tz: TimeZone>(now: DateTime<Tz>) -> String {
    format!(
        "{FILENAME_PREFIX}-{}.{ARTIFACT_EXTENSION}",
        now.with_timezone(&Utc).format("%Y-%m-%d-%H-%M-%S")
    )
}

//! Text and question extraction from uploaded files.
//!
//! Documents arrive as PDF or JSON. PDFs are handed to `pdf-extract` on a blocking thread;
//! JSON documents are rendered back to text so every key and value reaches the splitter.
//! Question files are JSON arrays of strings, or objects carrying such an array under
//! `questions`.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading uploaded documents or question lists.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// File contents were not valid JSON.
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        /// Path of the malformed file.
        path: PathBuf,
        /// Parser error with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// PDF text extraction failed.
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
    /// Questions file parsed but does not hold a list of strings.
    #[error(
        "Questions file must contain a JSON list of strings or an object with a 'questions' list"
    )]
    InvalidQuestions,
}

/// Document formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Arbitrary JSON value.
    Json,
}

impl DocumentKind {
    /// Classify an uploaded file by its extension, ignoring case.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Extension (with leading dot) used when persisting the upload.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Json => ".json",
        }
    }
}

/// Upper bound on a single PDF extraction; some fonts make `pdf-extract` spin.
pub const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Extract the text of every page of a PDF.
pub async fn load_pdf(path: &Path) -> Result<String, LoaderError> {
    let owned = path.to_path_buf();
    let text = extract_with_timeout(PDF_EXTRACT_TIMEOUT, move || {
        pdf_extract::extract_text(&owned).map_err(|error| error.to_string())
    })
    .await?;
    tracing::debug!(path = %path.display(), chars = text.len(), "Extracted PDF text");
    Ok(text)
}

/// Run a blocking extractor on the blocking pool, giving up after `limit`.
///
/// A timed-out extractor keeps its blocking thread until it returns; only the caller is released.
async fn extract_with_timeout<F>(limit: Duration, extract: F) -> Result<String, LoaderError>
where
    F: FnOnce() -> Result<String, String> + Send + 'static,
{
    // pdf-extract can panic on malformed fonts; the join error catches that.
    let joined = tokio::time::timeout(limit, tokio::task::spawn_blocking(extract))
        .await
        .map_err(|_| {
            tracing::warn!(limit_secs = limit.as_secs_f64(), "PDF extraction timed out");
            LoaderError::Pdf(format!("extraction timed out after {limit:?}"))
        })?;
    let extracted =
        joined.map_err(|error| LoaderError::Pdf(format!("extraction aborted: {error}")))?;
    extracted.map_err(LoaderError::Pdf)
}

/// Read a JSON document and render it as plain text.
///
/// A top-level string is returned verbatim; any other value is pretty-printed.
pub async fn load_json(path: &Path) -> Result<String, LoaderError> {
    let value = read_json(path).await?;
    let text = match value {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).map_err(|source| LoaderError::Json {
            path: path.to_path_buf(),
            source,
        })?,
    };
    Ok(text)
}

/// Read the question list from a JSON file.
pub async fn load_questions(path: &Path) -> Result<Vec<String>, LoaderError> {
    let value = read_json(path).await?;
    parse_questions(value)
}

/// Dispatch to the loader matching the document kind.
pub async fn load_document(path: &Path, kind: DocumentKind) -> Result<String, LoaderError> {
    match kind {
        DocumentKind::Pdf => load_pdf(path).await,
        DocumentKind::Json => load_json(path).await,
    }
}

/// Interpret a parsed JSON value as a question list.
pub fn parse_questions(value: Value) -> Result<Vec<String>, LoaderError> {
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => return Err(LoaderError::InvalidQuestions),
        },
        _ => return Err(LoaderError::InvalidQuestions),
    };

    list.into_iter()
        .map(|item| match item {
            Value::String(question) => Ok(question),
            _ => Err(LoaderError::InvalidQuestions),
        })
        .collect()
}

async fn read_json(path: &Path) -> Result<Value, LoaderError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| LoaderError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Minimal PDF with one Helvetica text line per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let font_id = 3 + 2 * pages.len();
    let kids: Vec<String> = (0..pages.len())
        .map(|index| format!("{} 0 R", 3 + 2 * index))
        .collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
    ];
    for (index, text) in pages.iter().enumerate() {
        let contents_id = 4 + 2 * index;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {contents_id} 0 R >>"
        ));
        let stream = format!("BT /F1 24 Tf 72 700 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }
    let xref_at = pdf.len();
    pdf.extend_from_slice(
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
    );
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

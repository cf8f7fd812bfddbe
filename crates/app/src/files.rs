use std::path::{Component, Path, PathBuf};

/// Resolves a decoded request path to a PDF inside `root`.
///
/// Only plain relative paths are accepted. The resolved file must exist, end
/// in `.pdf` and, after following symlinks, still live under `root`.
pub async fn resolve_pdf_path(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    let plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !plain {
        return None;
    }

    let is_pdf = relative
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return None;
    }

    let root = tokio::fs::canonicalize(root).await.ok()?;
    let candidate = tokio::fs::canonicalize(root.join(relative)).await.ok()?;
    if !candidate.starts_with(&root) {
        return None;
    }

    let metadata = tokio::fs::metadata(&candidate).await.ok()?;
    metadata.is_file().then_some(candidate)
}

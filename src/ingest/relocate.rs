//! Moves committed source files into the processed directory

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Move `source` into `processed_dir`, returning the final path.
///
/// An existing file of the same name is never overwritten; the moved file
/// gets the document id appended to its stem instead.
pub async fn relocate(source: &Path, processed_dir: &Path, document_id: Uuid) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(processed_dir).await?;

    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;

    let mut target = processed_dir.join(file_name);
    if tokio::fs::try_exists(&target).await? {
        target = processed_dir.join(collision_name(source, document_id));
    }

    match tokio::fs::rename(source, &target).await {
        Ok(()) => Ok(target),
        Err(rename_err) => {
            // Cross-device moves can't rename
            tracing::debug!(
                "rename {} -> {} failed ({}), copying instead",
                source.display(),
                target.display(),
                rename_err
            );

            if let Err(copy_err) = tokio::fs::copy(source, &target).await {
                let _ = tokio::fs::remove_file(&target).await;
                return Err(copy_err);
            }
            tokio::fs::remove_file(source).await?;
            Ok(target)
        }
    }
}

fn collision_name(source: &Path, document_id: Uuid) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match source.extension() {
        Some(ext) => format!("{}-{}.{}", stem, document_id, ext.to_string_lossy()),
        None => format!("{}-{}", stem, document_id),
    }
}

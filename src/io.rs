use std::path::{Path, PathBuf};

use miette::{miette, Context, IntoDiagnostic, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// Characters that are not allowed or troublesome in file names on common filesystems
const FORBIDDEN_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Remove the characters that cannot be part of a file name and collapse whitespace.
pub fn sanitize_file_name(name: &str) -> String {
    name.split(|c: char| FORBIDDEN_CHARS.contains(&c) || c.is_control())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches('.')
        .to_owned()
}

/// Find a path in `out_dir` that does not exist yet.
///
/// Format for the 1st file: `<stem>.<ext>`,
/// for the 2nd file and up: `<stem> (<count>).<ext>`.
pub fn find_unused_path(out_dir: &Path, stem: &str, ext: Option<&str>) -> Result<PathBuf> {
    let file_name = |suffix: &str| match ext {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    };

    let output = out_dir.join(file_name(""));
    if !output.exists() {
        return Ok(output);
    }

    for n in 2u16..=u16::MAX {
        let output = out_dir.join(file_name(&format!(" ({n})")));
        if !output.exists() {
            return Ok(output);
        }
    }

    Err(miette!("Too many files named '{stem}' in {}", out_dir.display()))
}

/// Rename a downloaded file, keeping it in the same directory.
///
/// Without an extension in `new_name`, the current one is kept.
/// Never overwrites an existing file: a counter is added to the name instead.
pub fn rename_output(path: &Path, new_name: &str) -> Result<PathBuf> {
    let new_name = sanitize_file_name(new_name);
    if new_name.is_empty() {
        return Err(miette!("The new file name is empty"));
    }

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let current_ext = path.extension().and_then(|ext| ext.to_str());

    let requested = Path::new(&new_name);
    let (stem, ext) = match (requested.file_stem(), requested.extension()) {
        (Some(stem), Some(ext)) if looks_like_extension(&ext.to_string_lossy()) => {
            (stem.to_string_lossy(), Some(ext.to_string_lossy()))
        }
        _ => (new_name.as_str().into(), current_ext.map(Into::into)),
    };

    let wanted = match &ext {
        Some(ext) => dir.join(format!("{stem}.{ext}")),
        None => dir.join(&*stem),
    };
    if wanted == path {
        debug!("File already named {}", wanted.display());
        return Ok(wanted);
    }

    let target = find_unused_path(dir, &stem, ext.as_deref())?;
    std::fs::rename(path, &target)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not rename {} to {}", path.display(), target.display()))?;

    Ok(target)
}

/// `mkv` or `mp4` are extensions, the `5` of `Episode 1.5` or the `final cut` of `v2.final cut` are not.
fn looks_like_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && !ext.chars().all(|c| c.is_ascii_digit())
}

/// Create a named temporary file next to the final destination and return its handle.
///
/// Being in the same directory, it can replace the destination with a simple rename.
///
/// The file destructor will be called at the handle drop.
/// **As such, one must not simply get the file path and drop the handle.**
pub fn named_tempfile_in(dir: &Path, ext: Option<&str>) -> Result<NamedTempFile> {
    let suffix = ext.map(|ext| format!(".{ext}")).unwrap_or_default();
    tempfile::Builder::new()
        .prefix(".grabclip-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not create a temporary file in {}", dir.display()))
}

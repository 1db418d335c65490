use crate::models::Form;
use crate::parsing::{ParseError, parse};
use crate::serialize::{SerializeOptions, serialize};
use relative_path::RelativePath;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid forms directory: {0}")]
    InvalidFormsDir(String),
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Read a form document and return its text
pub fn read_form(relative_path: &RelativePath, forms_root: &Path) -> Result<String, IoError> {
    let absolute_path = relative_path.to_path(forms_root);
    if !absolute_path.exists() {
        return Err(IoError::NotFound(absolute_path));
    }
    fs::read_to_string(&absolute_path).map_err(IoError::Io)
}

/// Read and parse a form document
pub fn load_form(relative_path: &RelativePath, forms_root: &Path) -> Result<Form, IoError> {
    let text = read_form(relative_path, forms_root)?;
    parse(&text).map_err(|source| IoError::Parse {
        path: relative_path.to_path(forms_root),
        source,
    })
}

/// Write document text, creating parent directories as needed
pub fn write_form(
    relative_path: &RelativePath,
    forms_root: &Path,
    content: &str,
) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(forms_root);

    if let Some(parent) = absolute_path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }

    fs::write(&absolute_path, content).map_err(IoError::Io)
}

/// Serialize a form canonically and write it
pub fn save_form(
    relative_path: &RelativePath,
    forms_root: &Path,
    form: &Form,
    options: SerializeOptions,
) -> Result<(), IoError> {
    write_form(relative_path, forms_root, &serialize(form, options))
}

/// Scan for form documents (`*.md`) under the forms directory, sorted
pub fn scan_form_files(forms_root: &Path) -> Result<Vec<PathBuf>, IoError> {
    validate_forms_dir(forms_root)?;

    let mut files = Vec::new();
    scan_directory_recursive(forms_root, &mut files)?;
    files.sort();
    Ok(files)
}

fn scan_directory_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IoError> {
    let entries = fs::read_dir(dir).map_err(IoError::Io)?;

    for entry in entries {
        let entry = entry.map_err(IoError::Io)?;
        let path = entry.path();

        if path.is_dir() {
            scan_directory_recursive(&path, files)?;
        } else if let Some(ext) = path.extension()
            && ext == "md"
        {
            files.push(path);
        }
    }

    Ok(())
}

pub fn validate_forms_dir(path: &Path) -> Result<(), IoError> {
    if !path.is_dir() {
        return Err(IoError::InvalidFormsDir(format!(
            "forms directory not found: {}",
            path.display()
        )));
    }
    Ok(())
}

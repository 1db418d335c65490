use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A small canonical form document.
pub const MINIMAL_FORM: &str = r#"{% form id="simple" title="Simple" %}

{% field kind="string" id="name" label="Name" required=true %}
{% /field %}

{% /form %}
"#;

/// Create a temporary forms directory
pub fn create_test_forms_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Create a test form file with content
pub fn create_test_file(forms_dir: &TempDir, filename: &str, content: &str) -> PathBuf {
    let file_path = forms_dir.path().join(filename);
    fs::write(&file_path, content).unwrap();
    file_path
}

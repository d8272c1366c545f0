use std::io::{Cursor, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::SdkError;

/// One file of a function's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
  /// Path inside the package.
  pub path: String,
  pub contents: Vec<u8>,
}

/// The code behind a user function and what it needs to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSource {
  /// `module:function` the engine invokes.
  pub entry_point: String,
  pub files: Vec<SourceFile>,
  pub requirements: Vec<String>,
}

impl FunctionSource {
  pub fn new(entry_point: impl Into<String>) -> Self {
    Self {
      entry_point: entry_point.into(),
      ..Default::default()
    }
  }

  pub fn file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
    self.files.push(SourceFile {
      path: path.into(),
      contents: contents.into(),
    });
    self
  }

  /// Add a file from disk under its file name.
  pub fn read_file(self, path: &Path) -> Result<Self, SdkError> {
    let contents = std::fs::read(path)?;
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| SdkError::user_argument(format!("{} is not a file", path.display())))?
      .to_string();
    Ok(self.file(name, contents))
  }

  pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
    self.requirements.push(requirement.into());
    self
  }
}

/// Turns a function's source into the archive uploaded with the DAG.
pub trait FunctionPackager {
  fn package(&self, source: &FunctionSource) -> Result<Vec<u8>, SdkError>;
}

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Packages source files and a generated `requirements.txt` into a zip.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl FunctionPackager for ZipPackager {
  fn package(&self, source: &FunctionSource) -> Result<Vec<u8>, SdkError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for file in &source.files {
      if file.path == REQUIREMENTS_FILE {
        continue;
      }
      writer.start_file(file.path.as_str(), options)?;
      writer.write_all(&file.contents)?;
    }

    writer.start_file(REQUIREMENTS_FILE, options)?;
    let mut requirements = source.requirements.join("\n");
    if !requirements.is_empty() {
      requirements.push('\n');
    }
    writer.write_all(requirements.as_bytes())?;

    Ok(writer.finish()?.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;
  use zip::ZipArchive;

  fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
  }

  #[test]
  fn test_zip_contains_sources_and_requirements() {
    let source = FunctionSource::new("model:predict")
      .file("model.py", "def predict(df):\n    return df\n")
      .requirement("pandas==2.1.0")
      .requirement("scikit-learn");

    let bytes = ZipPackager.package(&source).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

    assert_eq!(archive.len(), 2);
    assert!(read_entry(&mut archive, "model.py").contains("def predict"));
    assert_eq!(
      read_entry(&mut archive, REQUIREMENTS_FILE),
      "pandas==2.1.0\nscikit-learn\n"
    );
  }

  #[test]
  fn test_generated_requirements_replace_supplied_file() {
    let source = FunctionSource::new("model:predict")
      .file(REQUIREMENTS_FILE, "numpy\n")
      .requirement("pandas");

    let bytes = ZipPackager.package(&source).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(read_entry(&mut archive, REQUIREMENTS_FILE), "pandas\n");
  }

  #[test]
  fn test_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clean.py");
    std::fs::write(&path, "def clean(df): return df").unwrap();

    let source = FunctionSource::new("clean:clean").read_file(&path).unwrap();
    assert_eq!(source.files[0].path, "clean.py");
  }
}

// repository_folder.rs
// A workflow's file-based side storage (spec "External Interfaces", C2): a
// staging folder a step can freely add/remove files in, sealed the moment
// the workflow commits so subsequent edits raise `ImmutableAfterCommit`
// instead of silently corrupting already-hashed inputs.
use crate::errors::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use wf_domain::EngineError;

pub trait RepositoryFolder: Send + Sync {
  fn make_temp_folder(&self) -> Result<PathBuf>;
  fn move_into(&self, staged: &Path) -> Result<()>;
  fn insert_path(&self, src: &Path, name: &str) -> Result<()>;
  fn remove_path(&self, name: &str) -> Result<()>;
  fn get_abs_path(&self, name: &str) -> Result<PathBuf>;
  fn list(&self) -> Result<Vec<String>>;
  fn commit(&self);
  fn is_committed(&self) -> bool;
}

/// Plain filesystem implementation, rooted under `EngineConfig::repo_root`.
pub struct FsRepositoryFolder {
  root: PathBuf,
  committed: AtomicBool,
}

impl FsRepositoryFolder {
  pub fn new(root: PathBuf) -> std::io::Result<Self> {
    std::fs::create_dir_all(&root)?;
    Ok(Self { root, committed: AtomicBool::new(false) })
  }

  fn ensure_mutable(&self) -> Result<()> {
    if self.committed.load(Ordering::SeqCst) {
      return Err(EngineError::ImmutableAfterCommit.into());
    }
    Ok(())
  }
}

impl RepositoryFolder for FsRepositoryFolder {
  fn make_temp_folder(&self) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("wf-repo-staging-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).map_err(|e| EngineError::Io(e.to_string()))?;
    Ok(dir)
  }

  fn move_into(&self, staged: &Path) -> Result<()> {
    self.ensure_mutable()?;
    for entry in std::fs::read_dir(staged).map_err(|e| EngineError::Io(e.to_string()))? {
      let entry = entry.map_err(|e| EngineError::Io(e.to_string()))?;
      let dest = self.root.join(entry.file_name());
      std::fs::rename(entry.path(), dest).map_err(|e| EngineError::Io(e.to_string()))?;
    }
    std::fs::remove_dir_all(staged).ok();
    Ok(())
  }

  fn insert_path(&self, src: &Path, name: &str) -> Result<()> {
    self.ensure_mutable()?;
    std::fs::copy(src, self.root.join(name)).map_err(|e| EngineError::Io(e.to_string()))?;
    Ok(())
  }

  fn remove_path(&self, name: &str) -> Result<()> {
    self.ensure_mutable()?;
    std::fs::remove_file(self.root.join(name)).map_err(|e| EngineError::Io(e.to_string()))?;
    Ok(())
  }

  fn get_abs_path(&self, name: &str) -> Result<PathBuf> {
    let path = self.root.join(name);
    if !path.exists() {
      return Err(EngineError::NotExistent(name.to_string()).into());
    }
    Ok(path)
  }

  fn list(&self) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&self.root).map_err(|e| EngineError::Io(e.to_string()))? {
      let entry = entry.map_err(|e| EngineError::Io(e.to_string()))?;
      if let Some(name) = entry.file_name().to_str() {
        names.push(name.to_string());
      }
    }
    names.sort();
    Ok(names)
  }

  fn commit(&self) {
    self.committed.store(true, Ordering::SeqCst);
  }

  fn is_committed(&self) -> bool {
    self.committed.load(Ordering::SeqCst)
  }
}

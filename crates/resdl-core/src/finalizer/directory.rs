//! Delivery into a local directory.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use super::{sanitize_file_name, Deliver};

/// Temporary suffix used while the artifact is being written.
pub const TEMP_SUFFIX: &str = ".part";

/// Writes artifacts to `<dir>/<sanitized name>`.
///
/// The bytes go to a `.part` file first and are renamed into place, so a crash
/// never leaves a truncated file under the final name. An existing file is
/// never overwritten: `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, ...
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// First `<dir>/<name>` variant that does not exist yet.
async fn unique_path(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for n in 1u32.. {
        let numbered = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(numbered);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {name}"),
    ))
}

#[async_trait]
impl Deliver for DirectoryDelivery {
    async fn deliver(&self, file_name: &str, artifact: Vec<u8>) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = unique_path(&self.dir, &sanitize_file_name(file_name)).await?;
        let tmp = temp_path(&final_path);

        let result = async {
            let mut f = tokio::fs::File::create(&tmp).await?;
            tokio::io::AsyncWriteExt::write_all(&mut f, &artifact).await?;
            f.sync_all().await?;
            drop(f);
            tokio::fs::rename(&tmp, &final_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tracing::debug!(path = %final_path.display(), "artifact written");
        Ok(())
    }
}

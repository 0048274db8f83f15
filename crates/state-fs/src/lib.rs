//! Implementation of unit state storage using a JSON file on disk.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use microcloud_state::{PersistentState, StateStore};
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::debug;

/// Unit state stored in a single file.
#[derive(Clone, Debug)]
pub struct FsStateStore {
    path: PathBuf,
}

impl FsStateStore {
    /// Creates a new `FsStateStore` backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file holding the state.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FsStateStore {
    type Error = Error;

    async fn load(&self) -> Result<PersistentState, Self::Error> {
        match fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(Error::Deserialize),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no state at {}, starting fresh", self.path.display());
                Ok(PersistentState::default())
            }
            Err(e) => Err(Error::Io("error reading state file", e)),
        }
    }

    async fn save(&self, state: &PersistentState) -> Result<(), Self::Error> {
        let data = serde_json::to_vec_pretty(state).map_err(Error::Serialize)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Io("error creating state directory", e))?;
            }
        }

        // The rename keeps a crash from leaving a truncated file behind.
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Io("error creating state file", e))?;
        file.write_all(&data)
            .await
            .map_err(|e| Error::Io("error writing state file", e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Io("error syncing state file", e))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::Io("error replacing state file", e))?;

        Ok(())
    }
}

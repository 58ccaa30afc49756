//! First-use provisioning of bundled profile databases.
//!
//! # Responsibility
//! - Copy a bundled default database into the active data location when
//!   no local copy exists yet.
//!
//! # Invariants
//! - An existing destination file is never overwritten.
//! - The destination appears atomically: readers see either no file or the
//!   complete copy.

use crate::config::{Profile, ProfileConfig};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug)]
pub enum ProvisionError {
    MissingBundledAsset { profile: Profile, path: PathBuf },
    Io { path: PathBuf, source: io::Error },
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBundledAsset { profile, path } => write!(
                f,
                "no bundled database for profile `{profile}` at {}",
                path.display()
            ),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingBundledAsset { .. } => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Source of bundled default assets.
pub trait AssetProvider {
    /// Where the bundled database for `profile` would live.
    fn bundled_db_path(&self, profile: Profile) -> PathBuf;

    /// Path of the bundled database for `profile`, if one ships.
    fn bundled_db(&self, profile: Profile) -> Option<PathBuf> {
        let path = self.bundled_db_path(profile);
        path.is_file().then_some(path)
    }
}

/// Bundled assets laid out as `<root>/db/<profile db file>`.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetProvider for DirectoryAssets {
    fn bundled_db_path(&self, profile: Profile) -> PathBuf {
        self.root.join("db").join(profile.db_file_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Copied,
}

/// Ensures `config.db_path` exists, copying the bundled database if needed.
pub fn ensure_profile_db(
    config: &ProfileConfig,
    assets: &dyn AssetProvider,
) -> ProvisionResult<ProvisionOutcome> {
    if config.db_path.is_file() {
        return Ok(ProvisionOutcome::AlreadyPresent);
    }

    let Some(bundled) = assets.bundled_db(config.profile) else {
        warn!(
            "event=provision module=provision status=missing_asset profile={}",
            config.profile
        );
        return Err(ProvisionError::MissingBundledAsset {
            profile: config.profile,
            path: assets.bundled_db_path(config.profile),
        });
    };

    let outcome = copy_atomically(&bundled, &config.db_path)?;
    info!(
        "event=provision module=provision status=ok profile={} outcome={:?} dest={}",
        config.profile,
        outcome,
        config.db_path.display()
    );
    Ok(outcome)
}

fn copy_atomically(source: &Path, dest: &Path) -> ProvisionResult<ProvisionOutcome> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ProvisionError::Io { path, source }
    };

    let dest_dir = dest
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dest_dir).map_err(io_err(dest_dir))?;

    let mut reader = File::open(source).map_err(io_err(source))?;
    let mut staged = NamedTempFile::new_in(dest_dir).map_err(io_err(dest_dir))?;
    io::copy(&mut reader, staged.as_file_mut()).map_err(io_err(staged.path()))?;
    staged.as_file().sync_all().map_err(io_err(staged.path()))?;

    match staged.persist_noclobber(dest) {
        Ok(_) => Ok(ProvisionOutcome::Copied),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(ProvisionOutcome::AlreadyPresent)
        }
        Err(err) => Err(ProvisionError::Io {
            path: dest.to_path_buf(),
            source: err.error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_profile_db, DirectoryAssets, ProvisionError, ProvisionOutcome};
    use crate::config::{Profile, ProfileConfig};
    use std::fs;

    #[test]
    fn copies_bundled_db_once() {
        let assets_dir = tempfile::tempdir().expect("assets dir");
        fs::create_dir_all(assets_dir.path().join("db")).expect("db dir");
        fs::write(assets_dir.path().join("db").join("spectra.sqlite"), b"bundled")
            .expect("bundled file");
        let data_dir = tempfile::tempdir().expect("data dir");
        let config = ProfileConfig::new(
            Profile::Atomic,
            data_dir.path().join("normalized"),
            data_dir.path().join("db").join("spectra.sqlite"),
        );
        let assets = DirectoryAssets::new(assets_dir.path());

        assert_eq!(
            ensure_profile_db(&config, &assets).expect("first provision"),
            ProvisionOutcome::Copied
        );
        assert_eq!(fs::read(&config.db_path).expect("copied"), b"bundled");

        fs::write(&config.db_path, b"local").expect("local edit");
        assert_eq!(
            ensure_profile_db(&config, &assets).expect("second provision"),
            ProvisionOutcome::AlreadyPresent
        );
        assert_eq!(fs::read(&config.db_path).expect("kept"), b"local");
    }

    #[test]
    fn missing_asset_is_reported() {
        let empty = tempfile::tempdir().expect("assets dir");
        let data_dir = tempfile::tempdir().expect("data dir");
        let config = ProfileConfig::new(
            Profile::Molecular,
            data_dir.path().join("normalized_molecular"),
            data_dir.path().join("db").join("spectra_molecular.sqlite"),
        );

        let err = ensure_profile_db(&config, &DirectoryAssets::new(empty.path()))
            .expect_err("no bundled db");
        match &err {
            ProvisionError::MissingBundledAsset { profile, path } => {
                assert_eq!(*profile, Profile::Molecular);
                assert_eq!(path, &empty.path().join("db").join("spectra_molecular.sqlite"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&empty.path().display().to_string()));
        assert!(!config.db_path.exists());
    }
}

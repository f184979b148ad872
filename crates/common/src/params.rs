//! Fixed sizes the proving circuit is compiled for.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment, File};
use serde::{Deserialize, Serialize};

use idxtree_errors::TreeError;

const ENV_PREFIX: &str = "IDXTREE";

/// Highest tree height any tree accepts. Leaf indices and counts must stay representable as
/// `u64`.
pub const MAX_TREE_HEIGHT: usize = 63;

pub const MAX_NOTE_HASHES_PER_TX: usize = 64;
pub const MAX_NULLIFIERS_PER_TX: usize = 64;
pub const MAX_PUBLIC_DATA_WRITES_PER_TX: usize = 32;

pub const NOTE_HASH_TREE_HEIGHT: usize = 32;
pub const NULLIFIER_TREE_HEIGHT: usize = 20;
pub const PUBLIC_DATA_TREE_HEIGHT: usize = 40;

pub const NOTE_HASH_SUBTREE_HEIGHT: usize = 6;
pub const NULLIFIER_SUBTREE_HEIGHT: usize = 6;
pub const PUBLIC_DATA_SUBTREE_HEIGHT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitParams {
    pub max_note_hashes_per_tx: usize,
    pub max_nullifiers_per_tx: usize,
    pub max_public_data_writes_per_tx: usize,
    pub note_hash_tree_height: usize,
    pub note_hash_subtree_height: usize,
    pub nullifier_tree_height: usize,
    pub nullifier_subtree_height: usize,
    pub public_data_tree_height: usize,
    pub public_data_subtree_height: usize,
    /// Leaves a fresh nullifier tree is prefilled with, the zero leaf included.
    pub initial_nullifier_tree_size: u64,
    /// Leaves a fresh public data tree is prefilled with, the zero leaf included.
    pub initial_public_data_tree_size: u64,
}

impl Default for CircuitParams {
    fn default() -> Self {
        Self {
            max_note_hashes_per_tx: MAX_NOTE_HASHES_PER_TX,
            max_nullifiers_per_tx: MAX_NULLIFIERS_PER_TX,
            max_public_data_writes_per_tx: MAX_PUBLIC_DATA_WRITES_PER_TX,
            note_hash_tree_height: NOTE_HASH_TREE_HEIGHT,
            note_hash_subtree_height: NOTE_HASH_SUBTREE_HEIGHT,
            nullifier_tree_height: NULLIFIER_TREE_HEIGHT,
            nullifier_subtree_height: NULLIFIER_SUBTREE_HEIGHT,
            public_data_tree_height: PUBLIC_DATA_TREE_HEIGHT,
            public_data_subtree_height: PUBLIC_DATA_SUBTREE_HEIGHT,
            initial_nullifier_tree_size: 2 * MAX_NULLIFIERS_PER_TX as u64,
            initial_public_data_tree_size: 2 * MAX_PUBLIC_DATA_WRITES_PER_TX as u64,
        }
    }
}

impl CircuitParams {
    /// Loads parameters from an optional TOML file, then from `IDXTREE_*` environment variables,
    /// on top of the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigSource::builder().add_source(
            ConfigSource::try_from(&Self::default()).context("Failed to build default params")?,
        );
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config_source = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to build config")?;

        let params: Self =
            config_source.try_deserialize().context("Failed to deserialize circuit params")?;
        params.validate().context("Invalid circuit params")?;
        debug!("loaded circuit params: {:?}", params);
        Ok(params)
    }

    /// Writes the default parameters to `config_path` unless a file already exists there.
    pub fn ensure_config_file_exists(config_path: &Path) -> Result<()> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let config_toml =
                toml::to_string(&Self::default()).context("Failed to serialize default params")?;
            fs::write(config_path, config_toml).context("Failed to write default params")?;
        }
        Ok(())
    }

    pub const fn note_hash_subtree_sibling_path_len(&self) -> usize {
        self.note_hash_tree_height - self.note_hash_subtree_height
    }

    pub const fn nullifier_subtree_sibling_path_len(&self) -> usize {
        self.nullifier_tree_height - self.nullifier_subtree_height
    }

    pub const fn public_data_subtree_sibling_path_len(&self) -> usize {
        self.public_data_tree_height - self.public_data_subtree_height
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        check_tree(
            "note hash",
            self.note_hash_tree_height,
            self.note_hash_subtree_height,
            self.max_note_hashes_per_tx,
        )?;
        check_tree(
            "nullifier",
            self.nullifier_tree_height,
            self.nullifier_subtree_height,
            self.max_nullifiers_per_tx,
        )?;
        check_tree(
            "public data",
            self.public_data_tree_height,
            self.public_data_subtree_height,
            self.max_public_data_writes_per_tx,
        )?;
        check_initial_size(self.initial_nullifier_tree_size, self.nullifier_subtree_height)?;
        check_initial_size(
            self.initial_public_data_tree_size,
            self.public_data_subtree_height,
        )
    }
}

fn check_tree(
    name: &str,
    height: usize,
    subtree_height: usize,
    batch_size: usize,
) -> Result<(), TreeError> {
    if height == 0 || height > MAX_TREE_HEIGHT {
        return Err(TreeError::InvalidHeight(format!(
            "{name} tree height {height} must be within 1..={MAX_TREE_HEIGHT}"
        )));
    }
    if subtree_height >= height {
        return Err(TreeError::InvalidHeight(format!(
            "{name} subtree height {subtree_height} must be below tree height {height}"
        )));
    }
    if batch_size != 1 << subtree_height {
        return Err(TreeError::length_mismatch(
            format!("{name} batch size"),
            1 << subtree_height,
            batch_size,
        ));
    }
    Ok(())
}

/// Prefilled trees must end on a subtree boundary so the first batch lands aligned.
fn check_initial_size(size: u64, subtree_height: usize) -> Result<(), TreeError> {
    let subtree_size = 1u64 << subtree_height;
    if size == 0 || size % subtree_size != 0 {
        return Err(TreeError::UnalignedSubtree {
            start_index: size,
            subtree_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let params = CircuitParams::default();
        params.validate().unwrap();
        assert_eq!(params.note_hash_subtree_sibling_path_len(), 26);
        assert_eq!(params.nullifier_subtree_sibling_path_len(), 14);
        assert_eq!(params.public_data_subtree_sibling_path_len(), 35);
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "nullifier_tree_height = 24").unwrap();

        let params = CircuitParams::load(Some(file.path())).unwrap();
        assert_eq!(params.nullifier_tree_height, 24);
        assert_eq!(params.public_data_tree_height, PUBLIC_DATA_TREE_HEIGHT);
    }

    #[test]
    fn test_load_rejects_invalid_heights() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "nullifier_tree_height = 6").unwrap();
        assert!(CircuitParams::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_validate() {
        let params = CircuitParams {
            public_data_tree_height: 64,
            ..CircuitParams::default()
        };
        assert!(matches!(params.validate(), Err(TreeError::InvalidHeight(_))));

        let params = CircuitParams {
            max_nullifiers_per_tx: 63,
            ..CircuitParams::default()
        };
        assert!(matches!(params.validate(), Err(TreeError::LengthMismatch { .. })));

        let params = CircuitParams {
            initial_public_data_tree_size: 40,
            ..CircuitParams::default()
        };
        assert!(matches!(params.validate(), Err(TreeError::UnalignedSubtree { .. })));
    }

    #[test]
    fn test_default_config_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idxtree").join("params.toml");
        CircuitParams::ensure_config_file_exists(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            toml::from_str::<CircuitParams>(&written).unwrap(),
            CircuitParams::default()
        );
    }
}

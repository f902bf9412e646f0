//! Dataset and tokenizer downloading from HuggingFace Hub.

use crate::resolve_cache_dir;
use foamtune_core::{FoamTuneError, Result, SecretString};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};

/// Branch where the Hub publishes auto-converted Parquet files.
const PARQUET_CONVERSION_REVISION: &str = "refs/convert/parquet";

fn hub_error(e: impl std::fmt::Display) -> FoamTuneError {
    FoamTuneError::Hub(e.to_string())
}

/// Build API with optional token authentication.
fn build_api(token: Option<&SecretString>, cache_dir: Option<&Path>) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Some(secret) = token {
        builder = builder.with_token(Some(secret.expose_secret().to_string()));
    }
    let cache_dir = resolve_cache_dir(cache_dir);
    tracing::debug!(cache_dir = %cache_dir.display(), "Hub cache");
    builder.with_cache_dir(cache_dir).build().map_err(hub_error)
}

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// A file on disk.
    Local(PathBuf),
    /// A Hub dataset id such as `YYgroup/NL2FOAM`.
    Hub(String),
}

impl DatasetSource {
    /// Classify a source string.
    ///
    /// Existing paths and anything with a file extension are local; a bare
    /// `owner/name` pair is a Hub id.
    pub fn parse(source: &str) -> Self {
        let path = Path::new(source);
        let parts: Vec<&str> = source.split('/').collect();
        let looks_like_id = parts.len() == 2
            && parts.iter().all(|p| !p.is_empty() && *p != "." && *p != "..")
            && path.extension().is_none();
        if looks_like_id && !path.exists() {
            Self::Hub(source.to_string())
        } else {
            Self::Local(path.to_path_buf())
        }
    }
}

/// Client for the Hub downloads the pipeline needs.
#[derive(Debug, Clone)]
pub struct HubClient {
    api: Api,
}

impl HubClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `token` - Optional authentication token (as SecretString for security)
    /// * `cache_dir` - Optional cache directory overriding the Hub default
    pub fn new(token: Option<&SecretString>, cache_dir: Option<&Path>) -> Result<Self> {
        Ok(Self {
            api: build_api(token, cache_dir)?,
        })
    }

    fn repo(&self, id: &str, repo_type: RepoType, revision: Option<&str>) -> ApiRepo {
        match revision {
            Some(rev) => self.api.repo(Repo::with_revision(
                id.to_string(),
                repo_type,
                rev.to_string(),
            )),
            None => self.api.repo(Repo::new(id.to_string(), repo_type)),
        }
    }

    /// Download the `tokenizer.json` of a model repository.
    pub async fn download_tokenizer(&self, model_id: &str, revision: Option<&str>) -> Result<PathBuf> {
        tracing::info!(model_id, "Downloading tokenizer.json");
        self.repo(model_id, RepoType::Model, revision)
            .get("tokenizer.json")
            .await
            .map_err(|e| hub_error(format!("{model_id}: tokenizer.json: {e}")))
    }

    /// Download every Parquet shard of a dataset split.
    ///
    /// Files in the requested revision are listed first; when none match,
    /// the Hub's Parquet conversion branch is tried.
    pub async fn download_dataset_parquet(
        &self,
        dataset_id: &str,
        split: &str,
        revision: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let repo = self.repo(dataset_id, RepoType::Dataset, revision);
        let mut shards = match repo.info().await {
            Ok(info) => {
                let files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
                select_split_shards(&files, split)
            }
            Err(e) => {
                tracing::warn!(dataset_id, error = %e, "Could not list dataset files");
                Vec::new()
            }
        };

        let repo = if shards.is_empty() {
            let converted = self.repo(dataset_id, RepoType::Dataset, Some(PARQUET_CONVERSION_REVISION));
            let info = converted.info().await.map_err(hub_error)?;
            let files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
            shards = select_split_shards(&files, split);
            converted
        } else {
            repo
        };

        if shards.is_empty() {
            return Err(hub_error(format!(
                "No parquet files found for split '{split}' in dataset '{dataset_id}'"
            )));
        }

        let mut paths = Vec::with_capacity(shards.len());
        for shard in &shards {
            tracing::info!(dataset_id, shard = %shard, "Downloading parquet shard");
            paths.push(repo.get(shard).await.map_err(hub_error)?);
        }
        Ok(paths)
    }
}

/// Pick the Parquet files belonging to `split`, sorted by path.
///
/// Matches the layouts the Hub uses: `data/{split}-00000-of-00002.parquet`,
/// `data/{split}.parquet`, `{config}/{split}/0000.parquet` and
/// `{split}/....parquet`.
pub fn select_split_shards(files: &[String], split: &str) -> Vec<String> {
    let mut shards: Vec<String> = files
        .iter()
        .filter(|file| {
            let path = Path::new(file.as_str());
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                return false;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let in_split_dir = path
                .parent()
                .into_iter()
                .flat_map(Path::components)
                .any(|c| c.as_os_str() == split);
            stem == split || stem.starts_with(&format!("{split}-")) || in_split_dir
        })
        .cloned()
        .collect();
    shards.sort();
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_sharded_layout() {
        let listing = files(&[
            "README.md",
            "data/train-00001-of-00002.parquet",
            "data/test-00000-of-00001.parquet",
            "data/train-00000-of-00002.parquet",
        ]);
        assert_eq!(
            select_split_shards(&listing, "train"),
            vec![
                "data/train-00000-of-00002.parquet",
                "data/train-00001-of-00002.parquet"
            ]
        );
    }

    #[test]
    fn test_select_converted_layout() {
        let listing = files(&[
            "default/train/0000.parquet",
            "default/train/0001.parquet",
            "default/validation/0000.parquet",
        ]);
        assert_eq!(select_split_shards(&listing, "validation"), vec!["default/validation/0000.parquet"]);
        assert_eq!(select_split_shards(&listing, "train").len(), 2);
        assert!(select_split_shards(&listing, "test").is_empty());
    }

    #[test]
    fn test_split_prefix_is_not_substring_match() {
        let listing = files(&["data/training_notes.parquet", "data/train.parquet"]);
        assert_eq!(select_split_shards(&listing, "train"), vec!["data/train.parquet"]);
    }

    #[test]
    fn test_dataset_source_parse() {
        assert_eq!(
            DatasetSource::parse("YYgroup/NL2FOAM"),
            DatasetSource::Hub("YYgroup/NL2FOAM".into())
        );
        assert_eq!(
            DatasetSource::parse("data/train.jsonl"),
            DatasetSource::Local(PathBuf::from("data/train.jsonl"))
        );
        assert!(matches!(DatasetSource::parse("./data"), DatasetSource::Local(_)));
        assert!(matches!(DatasetSource::parse("a/b/c"), DatasetSource::Local(_)));
    }

    #[test]
    fn test_existing_directory_is_local() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("owner")).unwrap();
        std::fs::create_dir(dir.path().join("owner/name")).unwrap();
        let source = dir.path().join("owner/name");
        assert!(matches!(
            DatasetSource::parse(source.to_str().unwrap()),
            DatasetSource::Local(_)
        ));
    }
}

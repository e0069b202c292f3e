use crate::{LLMError, Result};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const WEIGHTS: &str = "model.safetensors";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";
const CONFIG: &str = "config.json";
const TOKENIZER: &str = "tokenizer.json";
const TOKENIZER_CONFIG: &str = "tokenizer_config.json";

/// Paths of everything needed to run a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelFiles {
    pub weights: Vec<PathBuf>,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
}

/// Resolve model files from a local directory if `model` names one, otherwise from the hub.
pub fn get_model_files(model: &str, revision: &str) -> Result<ModelFiles> {
    let dir = Path::new(model);
    if dir.is_dir() {
        log::info!("Loading model files from {}", dir.display());
        get_local_model_files(dir)
    } else {
        log::info!("Fetching {model}@{revision} from the Hugging Face hub");
        get_hub_model_files(model, revision)
    }
}

pub fn get_local_model_files(dir: &Path) -> Result<ModelFiles> {
    let existing = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(LLMError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )))
        }
    };

    let weights = match existing(WEIGHTS_INDEX) {
        Ok(index) => read_weight_map(&index)?
            .iter()
            .map(|name| existing(name))
            .collect::<Result<_>>()?,
        Err(err) => {
            log::debug!("No weight index ({err}), expecting {WEIGHTS}");
            vec![existing(WEIGHTS)?]
        }
    };

    Ok(ModelFiles {
        weights,
        config: existing(CONFIG)?,
        tokenizer: existing(TOKENIZER)?,
        tokenizer_config: existing(TOKENIZER_CONFIG).ok(),
    })
}

fn get_hub_model_files(model: &str, revision: &str) -> Result<ModelFiles> {
    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        model.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let weights = match repo.get(WEIGHTS_INDEX) {
        Ok(index) => read_weight_map(&index)?
            .iter()
            .map(|name| repo.get(name).map_err(LLMError::from))
            .collect::<Result<_>>()?,
        Err(err) => {
            log::debug!("Fetching {WEIGHTS_INDEX} failed ({err}), trying {WEIGHTS}");
            vec![repo.get(WEIGHTS)?]
        }
    };

    Ok(ModelFiles {
        weights,
        config: repo.get(CONFIG)?,
        tokenizer: repo.get(TOKENIZER)?,
        tokenizer_config: repo.get(TOKENIZER_CONFIG).ok(),
    })
}

/// Shard file names listed in a `model.safetensors.index.json`, each once, in sorted order.
pub fn read_weight_map(index: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(index)?;
    let json: serde_json::Value = serde_json::from_reader(file)?;
    let weight_map = json
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            LLMError::InvalidModelConfig(format!("{} has no weight_map", index.display()))
        })?;

    let mut shards = BTreeSet::new();
    for v in weight_map.values() {
        let name = v.as_str().ok_or_else(|| {
            LLMError::InvalidModelConfig(format!("non-string shard name {v} in weight_map"))
        })?;
        shards.insert(name.to_string());
    }
    Ok(shards.into_iter().collect())
}

//! Model configuration and the model-folder loader.
//!
//! A model folder holds two things: an opaque weights file (`weights.onnx`,
//! consumed by whatever [`Denoiser`](crate::Denoiser) backend the host
//! plugs in) and a `model.txt` metadata file of `Key: value` lines. Only the
//! typed values matter to the engine; the weights stay a path handle.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable model configuration, replaced wholesale on each load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Samples per generated window.
    pub win_length: usize,
    /// Expected conditioning-vector length.
    pub num_parameters: usize,
    /// Training-time noise schedule (β per step).
    pub noise_schedule: Vec<f64>,
    /// Inference-time noise schedule; the training schedule when absent.
    pub inference_noise_schedule: Option<Vec<f64>>,
}

/// A loaded model folder: typed config plus the opaque weights handle.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub config: ModelConfig,
    /// Path to the weights file. The denoiser backend owns its semantics;
    /// the engine never reads it.
    pub weights_path: PathBuf,
}

impl ModelConfig {
    /// The schedule used at inference time.
    pub fn inference_schedule(&self) -> &[f64] {
        self.inference_noise_schedule
            .as_deref()
            .unwrap_or(&self.noise_schedule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.win_length == 0 {
            return Err(Error::InvalidConfig("win_length must be positive".into()));
        }
        if self.win_length % 2 != 0 {
            // Hop size is win_length / 2 exactly.
            return Err(Error::InvalidConfig(format!(
                "win_length {} must be even",
                self.win_length
            )));
        }
        if self.num_parameters == 0 {
            return Err(Error::InvalidConfig(
                "Number of parameters must be positive".into(),
            ));
        }
        validate_schedule("noise_schedule", &self.noise_schedule)?;
        if let Some(inference) = &self.inference_noise_schedule {
            validate_schedule("inference_noise_schedule", inference)?;
            if inference.len() > self.noise_schedule.len() {
                return Err(Error::InvalidConfig(format!(
                    "inference_noise_schedule has {} steps but noise_schedule only {}",
                    inference.len(),
                    self.noise_schedule.len()
                )));
            }
        }
        Ok(())
    }

    /// Parse the `model.txt` key/value format.
    ///
    /// Lines look like `win_length: 1024` or
    /// `noise_schedule: [0.0001, 0.0006, ...]`. Unrecognized keys are
    /// ignored; missing required keys are load errors.
    pub fn from_params_text(text: &str) -> Result<Self> {
        let mut win_length = None;
        let mut num_parameters = None;
        let mut noise_schedule = None;
        let mut inference_noise_schedule = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "win_length" => win_length = Some(parse_usize(key, value)?),
                "Number of parameters" => num_parameters = Some(parse_usize(key, value)?),
                "noise_schedule" => noise_schedule = Some(parse_float_array(key, value)?),
                "inference_noise_schedule" => {
                    inference_noise_schedule = Some(parse_float_array(key, value)?)
                }
                _ => {}
            }
        }

        let config = ModelConfig {
            win_length: win_length.ok_or_else(|| missing("win_length"))?,
            num_parameters: num_parameters.ok_or_else(|| missing("Number of parameters"))?,
            noise_schedule: noise_schedule.ok_or_else(|| missing("noise_schedule"))?,
            inference_noise_schedule,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a model folder (`model.txt` + `weights.onnx`).
    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<ModelAssets> {
        let dir = dir.as_ref();
        let params_path = dir.join("model.txt");
        let weights_path = dir.join("weights.onnx");

        let text = std::fs::read_to_string(&params_path)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", params_path.display(), e)))?;
        let config = Self::from_params_text(&text)?;

        if !weights_path.is_file() {
            tracing::warn!(
                "Weights file {} not found; denoiser backend may fail to initialize",
                weights_path.display()
            );
        }

        Ok(ModelAssets {
            config,
            weights_path,
        })
    }
}

fn validate_schedule(name: &str, schedule: &[f64]) -> Result<()> {
    if schedule.is_empty() {
        return Err(Error::InvalidConfig(format!("{name} is empty")));
    }
    for (i, &beta) in schedule.iter().enumerate() {
        // β outside (0, 1) makes 1/sqrt(1 - β) undefined or complex.
        if !(beta > 0.0 && beta < 1.0) || !beta.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "{name}[{i}] = {beta} is outside (0, 1)"
            )));
        }
    }
    Ok(())
}

fn missing(key: &str) -> Error {
    Error::ModelLoad(format!("model.txt is missing `{key}`"))
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    // Training scripts sometimes write integers as floats ("1024.0").
    let as_float: f64 = value
        .parse()
        .map_err(|_| Error::ModelLoad(format!("`{key}`: expected a number, got `{value}`")))?;
    if as_float < 0.0 || as_float.fract() != 0.0 {
        return Err(Error::ModelLoad(format!(
            "`{key}`: expected a non-negative integer, got `{value}`"
        )));
    }
    Ok(as_float as usize)
}

fn parse_float_array(key: &str, value: &str) -> Result<Vec<f64>> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| Error::ModelLoad(format!("`{key}`: expected a [..] array, got `{value}`")))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_matches(|c| c == '\'' || c == '"')
                .parse::<f64>()
                .map_err(|_| Error::ModelLoad(format!("`{key}`: bad array element `{s}`")))
        })
        .collect()
}

use burn::{
    module::{Param, RunningState},
    prelude::*,
    tensor::{DType, TensorData},
};
use safetensors::{
    tensor::{Dtype, TensorView},
    SafeTensors,
};
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, info};

use crate::{
    error::CheckpointError,
    model::{discriminator::Discriminator, generator::Generator},
};

pub const GENERATOR_WEIGHTS: &str = "weights_G.safetensors";
pub const DISCRIMINATOR_WEIGHTS: &str = "weights_D.safetensors";

const TRACKED_SUFFIX: &str = ".num_batches_tracked";

// ////////////////////////////////////////////////////////////////////////////
// State dict

/// Ordered mapping from dotted layer path (`conv2.1.running_mean`) to tensor
/// values, laid out the way PyTorch names `state_dict()` entries.
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorData>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, data: TensorData) {
        self.tensors.insert(key.into(), data);
    }

    pub fn get(&self, key: &str) -> Option<&TensorData> {
        self.tensors.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TensorData> {
        self.tensors.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorData)> {
        self.tensors.iter().map(|(key, data)| (key.as_str(), data))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    fn require(&self, key: &str) -> Result<&TensorData, CheckpointError> {
        self.get(key)
            .ok_or_else(|| CheckpointError::MissingKeys(vec![key.to_string()]))
    }

    /// Reads a safetensors file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dict = Self::from_bytes(&bytes)?;
        debug!("read {} tensors from {}", dict.len(), path.display());

        Ok(dict)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| CheckpointError::Format(e.to_string()))?;

        let mut dict = Self::new();
        for (name, view) in tensors.tensors() {
            let shape = view.shape().to_vec();
            let data = match view.dtype() {
                Dtype::F32 => {
                    let values: Vec<f32> = view
                        .data()
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect();
                    TensorData::new(values, shape)
                }
                Dtype::I64 => {
                    let values: Vec<i64> = view
                        .data()
                        .chunks_exact(8)
                        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                        .collect();
                    TensorData::new(values, shape)
                }
                other => {
                    return Err(CheckpointError::Dtype {
                        key: name,
                        dtype: format!("{other:?}"),
                    })
                }
            };
            dict.insert(name, data);
        }

        Ok(dict)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        let mut encoded = Vec::with_capacity(self.len());
        for (key, data) in self.iter() {
            let (dtype, bytes) = match data.dtype {
                DType::I64 => {
                    let values = data
                        .to_vec::<i64>()
                        .map_err(|e| CheckpointError::Format(format!("{key}: {e:?}")))?;
                    (Dtype::I64, values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())
                }
                _ => {
                    let values = data
                        .clone()
                        .convert::<f32>()
                        .to_vec::<f32>()
                        .map_err(|e| CheckpointError::Format(format!("{key}: {e:?}")))?;
                    (Dtype::F32, values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())
                }
            };
            encoded.push((key, dtype, data.shape.clone(), bytes));
        }

        let views = encoded
            .iter()
            .map(|(key, dtype, shape, bytes)| {
                TensorView::new(*dtype, shape.clone(), bytes)
                    .map(|view| (*key, view))
                    .map_err(|e| CheckpointError::Format(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        safetensors::serialize(views, None).map_err(|e| CheckpointError::Format(e.to_string()))
    }

    /// Writes a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Checks that `found` carries exactly the entries of `expected`, with the
/// same shapes. Batch-norm `num_batches_tracked` counters are tolerated for any
/// batch-norm prefix `expected` has.
pub fn validate_state_dict(expected: &StateDict, found: &StateDict) -> Result<(), CheckpointError> {
    let missing = expected
        .keys()
        .filter(|key| !found.contains_key(key))
        .map(String::from)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(CheckpointError::MissingKeys(missing));
    }

    let unexpected = found
        .keys()
        .filter(|key| !expected.contains_key(key) && !is_tracked_counter(expected, key))
        .map(String::from)
        .collect::<Vec<_>>();
    if !unexpected.is_empty() {
        return Err(CheckpointError::UnexpectedKeys(unexpected));
    }

    for (key, want) in expected.iter() {
        let got = found.require(key)?;
        if got.shape != want.shape {
            return Err(CheckpointError::ShapeMismatch {
                key: key.to_string(),
                expected: want.shape.clone(),
                found: got.shape.clone(),
            });
        }
        if !matches!(got.dtype, DType::F64 | DType::F32 | DType::F16 | DType::BF16) {
            return Err(CheckpointError::Dtype {
                key: key.to_string(),
                dtype: format!("{:?}", got.dtype),
            });
        }
    }

    Ok(())
}

fn is_tracked_counter(expected: &StateDict, key: &str) -> bool {
    key.strip_suffix(TRACKED_SUFFIX)
        .is_some_and(|prefix| expected.contains_key(&format!("{prefix}.running_mean")))
}

// ////////////////////////////////////////////////////////////////////////////
// Module plumbing

/// A network whose parameters and buffers can be exported to and restored
/// from a [`StateDict`].
pub trait StateDictModule: Sized {
    fn state_dict(&self) -> StateDict;

    /// Builds a copy of `self` with every entry replaced from `dict`. Extra
    /// entries in `dict` are ignored; use [`StateDictModule::load_state_dict`]
    /// for strict loading.
    fn apply_state_dict(&self, dict: &StateDict) -> Result<Self, CheckpointError>;

    /// Strict load: the dict must match [`StateDictModule::state_dict`] key for
    /// key and shape for shape. `self` is left untouched either way.
    fn load_state_dict(&self, dict: &StateDict) -> Result<Self, CheckpointError> {
        validate_state_dict(&self.state_dict(), dict)?;
        self.apply_state_dict(dict)
    }
}

pub(crate) fn export_param<B: Backend, const D: usize>(
    dict: &mut StateDict,
    key: String,
    param: &Param<Tensor<B, D>>,
) {
    dict.insert(key, param.val().to_data().convert::<f32>());
}

pub(crate) fn export_running<B: Backend, const D: usize>(
    dict: &mut StateDict,
    key: String,
    state: &RunningState<Tensor<B, D>>,
) {
    dict.insert(key, state.value().to_data().convert::<f32>());
}

fn checked_tensor<B: Backend, const D: usize>(
    dict: &StateDict,
    key: &str,
    current: Tensor<B, D>,
) -> Result<Tensor<B, D>, CheckpointError> {
    let data = dict.require(key)?;
    let expected = current.dims().to_vec();
    if data.shape != expected {
        return Err(CheckpointError::ShapeMismatch {
            key: key.to_string(),
            expected,
            found: data.shape.clone(),
        });
    }

    Ok(Tensor::from_data(data.clone().convert::<f32>(), &current.device()))
}

/// Replaces a trainable parameter, keeping its id so optimizer state stays bound.
pub(crate) fn import_param<B: Backend, const D: usize>(
    dict: &StateDict,
    key: &str,
    param: &Param<Tensor<B, D>>,
) -> Result<Param<Tensor<B, D>>, CheckpointError> {
    let tensor = checked_tensor(dict, key, param.val())?;
    Ok(Param::initialized(param.id, tensor.require_grad()))
}

pub(crate) fn import_running<B: Backend, const D: usize>(
    dict: &StateDict,
    key: &str,
    state: &RunningState<Tensor<B, D>>,
) -> Result<RunningState<Tensor<B, D>>, CheckpointError> {
    let tensor = checked_tensor(dict, key, state.value())?;
    Ok(RunningState::new(tensor))
}

// ////////////////////////////////////////////////////////////////////////////
// Pre-trained weights

/// Restores both networks from `weights_G.safetensors` and
/// `weights_D.safetensors` under `dir`. Both dicts are validated before either
/// network is returned, so a bad checkpoint never yields a half-loaded pair.
pub fn load_pretrained_weights<B: Backend>(
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    dir: &Path,
) -> Result<(Generator<B>, Discriminator<B>), CheckpointError> {
    let weights_g = StateDict::load(dir.join(GENERATOR_WEIGHTS))?;
    let weights_d = StateDict::load(dir.join(DISCRIMINATOR_WEIGHTS))?;

    let generator = generator.load_state_dict(&weights_g)?;
    let discriminator = discriminator.load_state_dict(&weights_d)?;
    info!("Loaded pre-trained weights from {}", dir.display());

    Ok((generator, discriminator))
}

//! Named parameter storage backed by a candle `VarMap`.
//!
//! Every trainable tensor of a model is registered here under a stable
//! name, which is what checkpoints are keyed by. Initial values are drawn
//! from the caller's seeded generator rather than candle's device RNG so a
//! whole run is reproducible from one seed.

use std::path::Path;

use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::{Embedding, Linear, Module, VarMap};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{Error, Result};

/// All trainable variables of one model.
pub struct ParamStore {
    varmap: VarMap,
    device: Device,
}

impl ParamStore {
    pub fn new(device: Device) -> Self {
        Self {
            varmap: VarMap::new(),
            device,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.all_vars().iter().map(|v| v.as_tensor().elem_count()).sum()
    }

    /// Register a tensor filled uniformly from `[-bound, bound]`.
    pub fn uniform<S: Into<Shape>, R: Rng + ?Sized>(
        &self,
        name: &str,
        shape: S,
        bound: f64,
        rng: &mut R,
    ) -> Result<Var> {
        let shape = shape.into();
        let bound = bound as f32;
        let dist = Uniform::new_inclusive(-bound, bound)
            .map_err(|e| Error::Config(format!("bad init range for {name}: {e}")))?;
        let data: Vec<f32> = (0..shape.elem_count()).map(|_| dist.sample(rng)).collect();
        let tensor = Tensor::from_vec(data, shape, &self.device)?;
        self.register(name, &tensor)
    }

    fn register(&self, name: &str, tensor: &Tensor) -> Result<Var> {
        let var = Var::from_tensor(tensor)?;
        let mut data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| Error::Validation("parameter map lock poisoned".into()))?;
        if data.contains_key(name) {
            return Err(Error::Validation(format!("duplicate parameter name {name}")));
        }
        data.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Embedding table of `rows x dim`, uniform in `±6/√dim`, rows pulled
    /// into the unit ball.
    pub fn embedding<R: Rng + ?Sized>(
        &self,
        name: &str,
        rows: usize,
        dim: usize,
        rng: &mut R,
    ) -> Result<EmbeddingTable> {
        let bound = 6.0 / (dim as f64).sqrt();
        let table = EmbeddingTable::new(self.uniform(name, (rows, dim), bound, rng)?, dim);
        table.renormalize()?;
        Ok(table)
    }

    /// Auxiliary per-relation table without renormalisation.
    pub fn table<R: Rng + ?Sized>(
        &self,
        name: &str,
        rows: usize,
        dim: usize,
        bound: f64,
        rng: &mut R,
    ) -> Result<EmbeddingTable> {
        Ok(EmbeddingTable::new(self.uniform(name, (rows, dim), bound, rng)?, dim))
    }

    /// Dense layer with `±1/√in_dim` initialisation.
    pub fn linear<R: Rng + ?Sized>(
        &self,
        name: &str,
        in_dim: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> Result<Linear> {
        let bound = 1.0 / (in_dim as f64).sqrt();
        let weight = self.uniform(&format!("{name}.weight"), (out_dim, in_dim), bound, rng)?;
        let bias = self.uniform(&format!("{name}.bias"), (out_dim,), bound, rng)?;
        Ok(Linear::new(
            weight.as_tensor().clone(),
            Some(bias.as_tensor().clone()),
        ))
    }

    /// Write every variable to a safetensors file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.varmap
            .save(path)
            .map_err(|e| Error::Checkpoint(format!("saving {}: {e}", path.display())))
    }

    /// Overwrite every variable from a safetensors file.
    ///
    /// All tensors are read and shape-checked before any variable is
    /// written, so a failed load leaves the parameters untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Checkpoint(format!("{} not found", path.display())));
        }
        let stored = candle_core::safetensors::load(path, &self.device)
            .map_err(|e| Error::Checkpoint(format!("reading {}: {e}", path.display())))?;
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| Error::Validation("parameter map lock poisoned".into()))?;

        let mut updates = Vec::with_capacity(data.len());
        for (name, var) in data.iter() {
            let tensor = stored
                .get(name)
                .ok_or_else(|| Error::Checkpoint(format!("missing tensor {name}")))?;
            if tensor.shape() != var.shape() {
                return Err(Error::Checkpoint(format!(
                    "shape mismatch for {name}: checkpoint {:?}, model {:?}",
                    tensor.dims(),
                    var.dims()
                )));
            }
            updates.push((var, tensor.to_dtype(DType::F32)?));
        }
        for (var, tensor) in updates {
            var.set(&tensor)?;
        }
        Ok(())
    }
}

/// A lookup table whose rows are entity or relation embeddings.
#[derive(Clone)]
pub struct EmbeddingTable {
    var: Var,
    lookup: Embedding,
}

impl EmbeddingTable {
    fn new(var: Var, dim: usize) -> Self {
        let lookup = Embedding::new(var.as_tensor().clone(), dim);
        Self { var, lookup }
    }

    /// Rows for `ids` (a `u32` index vector).
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        Ok(self.lookup.forward(ids)?)
    }

    pub fn weights(&self) -> &Tensor {
        self.var.as_tensor()
    }

    /// Row-wise L2 norms, still attached to the graph.
    pub fn row_norms(&self) -> Result<Tensor> {
        Ok(self.weights().sqr()?.sum(1)?.sqrt()?)
    }

    /// Scale every row with norm above one back onto the unit sphere.
    pub fn renormalize(&self) -> Result<()> {
        let w = self.weights().detach();
        let norms = w.sqr()?.sum_keepdim(1)?.sqrt()?;
        // max(norm, 1)
        let scale = norms.affine(1.0, -1.0)?.relu()?.affine(1.0, 1.0)?.recip()?;
        self.var.set(&w.broadcast_mul(&scale)?)?;
        Ok(())
    }

    /// `reduce(relu(||row|| - 1))`, mean when `average`, sum otherwise.
    pub fn norm_penalty(&self, average: bool) -> Result<Tensor> {
        let excess = self.row_norms()?.affine(1.0, -1.0)?.relu()?;
        Ok(if average {
            excess.mean_all()?
        } else {
            excess.sum_all()?
        })
    }
}

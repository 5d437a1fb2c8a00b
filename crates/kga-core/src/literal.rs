//! Per-entity numeric attributes ("literals").

use std::path::Path;

use candle_core::{DType, Device, Tensor};

use crate::error::{Error, Result};

const EPS: f64 = 1e-8;

/// An `n_entities x n_literals` table of `f32` attribute values.
#[derive(Debug, Clone)]
pub struct LiteralTable {
    values: Tensor,
}

impl LiteralTable {
    /// Wrap a 2-D tensor, converting it to `f32`.
    pub fn from_tensor(values: &Tensor) -> Result<Self> {
        if values.rank() != 2 {
            return Err(Error::InvalidDataset(format!(
                "literal table must be 2-D, got shape {:?}",
                values.dims()
            )));
        }
        Ok(Self {
            values: values.to_dtype(DType::F32)?,
        })
    }

    pub fn from_rows(rows: &[Vec<f32>], device: &Device) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::InvalidDataset("ragged literal rows".into()));
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::from_tensor(&Tensor::from_vec(flat, (rows.len(), width), device)?)
    }

    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Self::from_tensor(&Tensor::read_npy(path)?.to_device(device)?)
    }

    pub fn num_entities(&self) -> usize {
        self.values.dims()[0]
    }

    pub fn num_literals(&self) -> usize {
        self.values.dims()[1]
    }

    pub fn tensor(&self) -> &Tensor {
        &self.values
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            values: self.values.to_device(device)?,
        })
    }

    /// Rows for `entities`, in order.
    pub fn gather(&self, entities: &[usize]) -> Result<Tensor> {
        let ids: Vec<u32> = entities.iter().map(|&e| e as u32).collect();
        let ids = Tensor::from_vec(ids, (entities.len(),), self.values.device())?;
        Ok(self.values.index_select(&ids, 0)?)
    }

    /// Row of `entity` repeated `m` times.
    pub fn repeat_row(&self, entity: usize, m: usize) -> Result<Tensor> {
        let row = self.values.narrow(0, entity, 1)?;
        Ok(row.broadcast_as((m, self.num_literals()))?.contiguous()?)
    }

    /// Rescale every column to `[0, 1]`.
    pub fn min_max(&self) -> Result<Self> {
        let min = self.values.min_keepdim(0)?;
        let max = self.values.max_keepdim(0)?;
        let range = max.sub(&min)?.affine(1.0, EPS)?;
        let values = self.values.broadcast_sub(&min)?.broadcast_div(&range)?;
        Ok(Self { values })
    }

    /// Shift every column to zero mean and unit variance.
    pub fn standardize(&self) -> Result<Self> {
        let mean = self.values.mean_keepdim(0)?;
        let centered = self.values.broadcast_sub(&mean)?;
        let std = centered.sqr()?.mean_keepdim(0)?.sqrt()?.affine(1.0, EPS)?;
        Ok(Self {
            values: centered.broadcast_div(&std)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LiteralTable {
        LiteralTable::from_rows(
            &[vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn shape_accessors() {
        let t = table();
        assert_eq!(t.num_entities(), 3);
        assert_eq!(t.num_literals(), 2);
    }

    #[test]
    fn gather_and_repeat() {
        let t = table();
        let rows = t.gather(&[2, 0]).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rows, vec![vec![10.0, 30.0], vec![0.0, 10.0]]);
        let rep = t.repeat_row(1, 3).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rep, vec![vec![5.0, 20.0]; 3]);
    }

    #[test]
    fn min_max_maps_columns_to_unit_range() {
        let scaled = table().min_max().unwrap();
        let rows = scaled.tensor().to_vec2::<f32>().unwrap();
        assert!((rows[0][0] - 0.0).abs() < 1e-5);
        assert!((rows[1][1] - 0.5).abs() < 1e-5);
        assert!((rows[2][0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn standardize_centres_columns() {
        let scaled = table().standardize().unwrap();
        let col_means = scaled.tensor().mean(0).unwrap().to_vec1::<f32>().unwrap();
        assert!(col_means.iter().all(|m| m.abs() < 1e-5));
        let rows = scaled.tensor().to_vec2::<f32>().unwrap();
        assert!((rows[2][0] - 1.224_744_9).abs() < 1e-4);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let res = LiteralTable::from_rows(&[vec![1.0], vec![1.0, 2.0]], &Device::Cpu);
        assert!(res.is_err());
    }

    #[test]
    fn missing_file_is_not_found() {
        let res = LiteralTable::load("/nonexistent/literals.npy", &Device::Cpu);
        assert!(matches!(res, Err(Error::NotFound(_))));
    }
}

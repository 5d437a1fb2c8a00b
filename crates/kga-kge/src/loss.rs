//! Training objectives over plausibility scores.

use candle_core::Tensor;

use crate::error::{Error, Result};

fn reduce(losses: &Tensor, average: bool) -> Result<Tensor> {
    Ok(if average {
        losses.mean_all()?
    } else {
        losses.sum_all()?
    })
}

/// `relu(margin - pos + neg)` against `c` stacked negative blocks.
///
/// `negatives` holds `c` consecutive blocks, each aligned row-for-row with
/// `positives`; the positives are tiled `c` times to match.
pub fn margin_ranking(
    positives: &Tensor,
    negatives: &Tensor,
    margin: f64,
    c: usize,
    average: bool,
) -> Result<Tensor> {
    let pos = positives.flatten_all()?;
    let neg = negatives.flatten_all()?;
    if neg.elem_count() != pos.elem_count() * c {
        return Err(Error::Validation(format!(
            "{} negative scores do not form {c} blocks of {}",
            neg.elem_count(),
            pos.elem_count()
        )));
    }
    let pos = pos.repeat((c,))?;
    let hinge = neg.sub(&pos)?.affine(1.0, margin)?.relu()?;
    reduce(&hinge, average)
}

/// Numerically stable binary cross-entropy on logits.
///
/// `max(x, 0) - x·y + log(1 + exp(-|x|))` per row.
pub fn bce_with_logits(logits: &Tensor, labels: &[f32], average: bool) -> Result<Tensor> {
    let x = logits.flatten_all()?;
    if x.elem_count() != labels.len() {
        return Err(Error::Validation(format!(
            "{} logits for {} labels",
            x.elem_count(),
            labels.len()
        )));
    }
    let y = Tensor::from_slice(labels, (labels.len(),), x.device())?.to_dtype(x.dtype())?;
    let softplus = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let per_row = x.relu()?.sub(&x.mul(&y)?)?.add(&softplus)?;
    reduce(&per_row, average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn t(v: &[f32]) -> Tensor {
        Tensor::new(v, &Device::Cpu).unwrap()
    }

    fn scalar(x: Tensor) -> f32 {
        x.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn hinge_is_zero_when_positives_clear_the_margin() {
        let loss = margin_ranking(&t(&[5.0, 6.0]), &t(&[1.0, 2.0, 0.0, 0.0]), 1.0, 2, false).unwrap();
        assert_eq!(scalar(loss), 0.0);
    }

    #[test]
    fn hinge_aligns_blocks_with_positives() {
        // block 0: 1 - 2 + 3, 1 - 0 + 0; block 1: 1 - 2 + 0 (clipped), 1 - 0 + 4
        let pos = t(&[2.0, 0.0]);
        let neg = t(&[3.0, 0.0, 0.0, 4.0]);
        let sum = scalar(margin_ranking(&pos, &neg, 1.0, 2, false).unwrap());
        let mean = scalar(margin_ranking(&pos, &neg, 1.0, 2, true).unwrap());
        assert!((sum - 8.0).abs() < 1e-6);
        assert!((mean - 2.0).abs() < 1e-6);
    }

    #[test]
    fn hinge_rejects_misaligned_blocks() {
        assert!(margin_ranking(&t(&[1.0, 2.0]), &t(&[1.0, 2.0, 3.0]), 1.0, 2, true).is_err());
    }

    #[test]
    fn bce_matches_reference_values() {
        let logits = t(&[0.0, 2.0, -3.0]);
        let labels = [1.0, 0.0, 0.0];
        let expected: f32 = [
            (2.0f32).ln(),
            2.0 + (1.0 + (-2.0f32).exp()).ln(),
            (1.0 + (-3.0f32).exp()).ln(),
        ]
        .iter()
        .sum();
        let sum = scalar(bce_with_logits(&logits, &labels, false).unwrap());
        let mean = scalar(bce_with_logits(&logits, &labels, true).unwrap());
        assert!((sum - expected).abs() < 1e-5);
        assert!((mean - expected / 3.0).abs() < 1e-5);
    }

    #[test]
    fn bce_is_stable_for_large_logits() {
        let loss = bce_with_logits(&t(&[1000.0, -1000.0]), &[1.0, 0.0], false).unwrap();
        let v = scalar(loss);
        assert!(v.is_finite() && v.abs() < 1e-3);
    }

    #[test]
    fn bce_checks_label_count() {
        assert!(bce_with_logits(&t(&[0.0]), &[1.0, 0.0], true).is_err());
    }
}

use assert_cmd::Command;
use candle_core::{Device, Tensor};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn write_triplets(path: PathBuf, rows: &[[i64; 3]]) -> Result<(), Box<dyn std::error::Error>> {
    let flat: Vec<i64> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (rows.len(), 3), &Device::Cpu)?.write_npy(path)?;
    Ok(())
}

/// Ring over 8 entities with two relations, written as `<root>/toy`.
fn toy_dataset(root: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = root.join("toy");
    fs::create_dir_all(&dir)?;
    let train: Vec<[i64; 3]> = (0..8).map(|i| [i, i % 2, (i + 1) % 8]).collect();
    write_triplets(dir.join("train.npy"), &train)?;
    write_triplets(dir.join("val.npy"), &[[0, 1, 2], [3, 0, 7]])?;
    write_triplets(dir.join("test.npy"), &[[1, 1, 2], [2, 0, 3], [5, 1, 0]])?;
    Tensor::new(&[1f32, 1.0, 0.0], &Device::Cpu)?.write_npy(dir.join("y_test.npy"))?;
    Ok(dir)
}

fn kga() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("kga")?)
}

#[test]
fn test_cli_info() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dataset = toy_dataset(tmp.path())?;

    kga()?
        .arg("info")
        .arg("--dataset")
        .arg(&dataset)
        .assert()
        .success()
        .stdout(predicate::str::contains("Entities:   8"))
        .stdout(predicate::str::contains("Relations:  2"))
        .stdout(predicate::str::contains("Train:      8"))
        .stdout(predicate::str::contains("Test positives: 2"));
    Ok(())
}

#[test]
fn test_cli_train_then_test() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dataset = toy_dataset(tmp.path())?;
    let models = tmp.path().join("models");

    kga()?
        .args(["train", "--model", "distmult", "--k", "4", "--nepoch", "2", "--mbsize", "4"])
        .args(["--log-interval", "-1"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--checkpoint-dir")
        .arg(&models)
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkpoint:"));

    let checkpoint = models.join("toy").join("distmult_lr0.1_wd0.0001.safetensors");
    assert!(checkpoint.exists());
    let report = fs::read_to_string(checkpoint.with_extension("json"))?;
    assert!(report.contains("\"total_steps\": 4"));

    kga()?
        .args(["test", "--model", "distmult", "--k", "4", "--hits", "1,10"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--checkpoint")
        .arg(&checkpoint)
        .assert()
        .success()
        .stdout(predicate::str::contains("Test (2 triplets, raw)"))
        .stdout(predicate::str::contains("MRR:"))
        .stdout(predicate::str::contains("Hits@10"))
        .stdout(predicate::str::contains("AUC"))
        // five default candidates, capped at the two known relations
        .stdout(predicate::str::contains("Relations (2 candidates)"));

    kga()?
        .args(["test", "--model", "distmult", "--k", "4", "--relations", "0"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--checkpoint")
        .arg(&checkpoint)
        .assert()
        .success()
        .stdout(predicate::str::contains("Relations").not());

    // same checkpoint under a different architecture
    kga()?
        .args(["test", "--model", "distmult", "--k", "8"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--checkpoint")
        .arg(&checkpoint)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load checkpoint"));
    Ok(())
}

#[test]
fn test_cli_margin_training_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dataset = toy_dataset(tmp.path())?;
    let models = tmp.path().join("models");
    let config = tmp.path().join("run.toml");
    fs::write(
        &config,
        "[model]\nembedding_dim = 4\ndistance = \"l1\"\n\n[training]\nloss = \"margin\"\nepochs = 1\nnegative_samples = 2\nlog_interval = 1\n",
    )?;

    kga()?
        .args(["train", "--model", "transe", "--lr", "0.01", "--normalize-embed"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--config")
        .arg(&config)
        .arg("--checkpoint-dir")
        .arg(&models)
        .assert()
        .success()
        .stdout(predicate::str::contains("val_mrr"));

    let checkpoint = models.join("toy").join("transe_lr0.01_wd0.0001.safetensors");
    assert!(checkpoint.exists());

    kga()?
        .args(["test", "--model", "transe", "--relations", "2"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--config")
        .arg(&config)
        .arg("--checkpoint")
        .arg(&checkpoint)
        .assert()
        .success()
        .stdout(predicate::str::contains("Relations (2 candidates)"));
    Ok(())
}

#[test]
fn test_cli_rejects_bad_input() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dataset = toy_dataset(tmp.path())?;

    kga()?
        .args(["train", "--model", "complex"])
        .arg("--dataset")
        .arg(&dataset)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown model"));

    kga()?
        .args(["info", "--dataset"])
        .arg(tmp.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load dataset"));

    // literal models need a literal table
    kga()?
        .args(["train", "--model", "ermlp-literal", "--nepoch", "1"])
        .arg("--dataset")
        .arg(&dataset)
        .arg("--checkpoint-dir")
        .arg(tmp.path().join("models"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load literals"));
    Ok(())
}

//! End-to-end pipeline tests on a synthetic manifest with real JPEG files.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::SgdConfig;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use lesionnet::dataset::{
    load_manifest, split_samples, LesionDataset, SplitConfig, Transform,
};
use lesionnet::eval::evaluate;
use lesionnet::hpo::{run_study, MedianPruner, SearchSpace, StudyConfig};
use lesionnet::inference::Predictor;
use lesionnet::model::default_config;
use lesionnet::training::{Trainer, TrainingConfig};
use lesionnet::{default_device, DefaultBackend, LesionClass, TrainingBackend};

/// One-hot row for the manifest, `image,MEL,NV,BCC,AKIEC,BKL,DF,VASC`.
fn one_hot_row(image_id: &str, class: LesionClass) -> String {
    let mut row = String::from(image_id);
    for candidate in LesionClass::ALL {
        row.push(',');
        row.push_str(if candidate == class { "1.0" } else { "0.0" });
    }
    row
}

fn write_jpeg(dir: &Path, id: &str, seed: u8) {
    let img = RgbImage::from_fn(64, 64, |x, y| {
        Rgb([
            seed.wrapping_add(x as u8),
            seed.wrapping_mul(2).wrapping_add(y as u8),
            seed.wrapping_add((x + y) as u8),
        ])
    });
    img.save(dir.join(format!("{}.jpg", id))).unwrap();
}

/// Writes a manifest plus images for `(class, count)` pairs, returns the
/// manifest path and created image ids.
fn synthetic_dataset(tmp: &TempDir, classes: &[(LesionClass, usize)]) -> (PathBuf, Vec<String>) {
    let dir = tmp.path();
    let mut rows = String::from("image,MEL,NV,BCC,AKIEC,BKL,DF,VASC\n");
    let mut ids = Vec::new();

    let mut counter = 0u8;
    for &(class, count) in classes {
        for i in 0..count {
            let id = format!("{}_{}", class.code().to_lowercase(), i);
            write_jpeg(dir, &id, counter.wrapping_mul(37));
            rows.push_str(&one_hot_row(&id, class));
            rows.push('\n');
            ids.push(id);
            counter = counter.wrapping_add(1);
        }
    }

    let manifest = dir.join("ground_truth.csv");
    std::fs::write(&manifest, rows).unwrap();
    (manifest, ids)
}

#[test]
fn manifest_loading_skips_bad_rows() {
    let tmp = TempDir::new().unwrap();
    let (manifest, _) = synthetic_dataset(
        &tmp,
        &[(LesionClass::Nv, 5), (LesionClass::Mel, 2)],
    );

    // Append rows that must be skipped: two with missing image files and
    // one with an all-zero label row.
    let mut contents = std::fs::read_to_string(&manifest).unwrap();
    contents.push_str(&one_hot_row("missing_a", LesionClass::Bcc));
    contents.push('\n');
    contents.push_str(&one_hot_row("missing_b", LesionClass::Df));
    contents.push('\n');
    write_jpeg(tmp.path(), "zero_hot", 99);
    contents.push_str("zero_hot,0.0,0.0,0.0,0.0,0.0,0.0,0.0\n");
    std::fs::write(&manifest, contents).unwrap();

    let samples = load_manifest(&manifest, tmp.path()).unwrap();
    assert_eq!(samples.len(), 7);
    assert_eq!(
        samples
            .iter()
            .filter(|s| s.label == LesionClass::Nv)
            .count(),
        5
    );
}

#[test]
fn evaluation_covers_every_sample() {
    let tmp = TempDir::new().unwrap();
    let (manifest, _) = synthetic_dataset(
        &tmp,
        &[(LesionClass::Nv, 3), (LesionClass::Mel, 1)],
    );

    // Corrupt one image after the manifest existence check would pass.
    std::fs::write(tmp.path().join("nv_1.jpg"), b"truncated garbage").unwrap();

    let samples = load_manifest(&manifest, tmp.path()).unwrap();
    assert_eq!(samples.len(), 4);

    let device = default_device();
    let model = default_config().init::<DefaultBackend>(&device);
    let report = evaluate(
        &model,
        LesionDataset::new(samples, Transform::eval()),
        2,
        &device,
    )
    .unwrap();

    // The pass reaches the end of the dataset and the corrupt file does not
    // shrink the evaluated population.
    assert_eq!(report.metrics.total_samples, 4);
}

#[test]
fn train_eval_save_predict_round_trip() {
    let tmp = TempDir::new().unwrap();
    let (manifest, _) = synthetic_dataset(
        &tmp,
        &[(LesionClass::Nv, 5), (LesionClass::Mel, 3)],
    );

    let samples = load_manifest(&manifest, tmp.path()).unwrap();
    let split = split_samples(&samples, &SplitConfig::default()).unwrap();
    assert_eq!(split.train.len() + split.test.len(), 8);
    assert!(!split.test.is_empty());

    let device = default_device();
    let model = default_config().init::<TrainingBackend>(&device);
    let config = TrainingConfig::new()
        .with_epochs(1)
        .with_batch_size(2)
        .with_num_workers(1);
    let mut trainer = Trainer::new(model, SgdConfig::new().init(), config, device.clone());

    // Deterministic transform keeps the test fast and reproducible.
    let history = trainer
        .fit(LesionDataset::new(split.train, Transform::eval()))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].avg_loss.is_finite());
    assert!(history[0].samples_seen > 0);

    let report = evaluate(
        &trainer.model().valid(),
        LesionDataset::new(split.test.clone(), Transform::eval()),
        2,
        &device,
    )
    .unwrap();
    assert_eq!(report.metrics.total_samples, split.test.len());

    let checkpoint = tmp.path().join("model");
    trainer.save(&checkpoint).unwrap();

    let predictor = Predictor::<DefaultBackend>::from_file(&checkpoint, device).unwrap();
    let gray = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(
        100,
        100,
        Rgb([128, 128, 128]),
    ));
    let prediction = predictor.predict_image(&gray).unwrap();

    assert_eq!(prediction.probabilities.len(), 7);
    let sum: f32 = prediction.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
    let max = prediction
        .probabilities
        .iter()
        .cloned()
        .fold(f32::MIN, f32::max);
    assert_eq!(prediction.confidence, max);

    let response = prediction.to_response();
    assert_eq!(response.probabilities.len(), 7);
    let percent_sum: f32 = response
        .probabilities
        .values()
        .map(|v| v.trim_end_matches('%').parse::<f32>().unwrap())
        .sum();
    assert!((percent_sum - 100.0).abs() < 0.1);
}

#[test]
fn study_runs_single_trial() {
    let tmp = TempDir::new().unwrap();
    let (manifest, _) = synthetic_dataset(
        &tmp,
        &[(LesionClass::Nv, 4), (LesionClass::Bkl, 2)],
    );

    let samples = load_manifest(&manifest, tmp.path()).unwrap();
    let split = split_samples(&samples, &SplitConfig::default()).unwrap();

    let config = StudyConfig {
        trials: 1,
        timeout: None,
        epochs_per_trial: 1,
        seed: 7,
        space: SearchSpace {
            batch_sizes: vec![2],
            ..SearchSpace::default()
        },
        pruner: MedianPruner::default(),
    };

    let device = default_device();
    let report = run_study::<TrainingBackend>(
        LesionDataset::new(split.train, Transform::eval()),
        LesionDataset::new(split.test, Transform::eval()),
        &config,
        &device,
    )
    .unwrap();

    assert_eq!(report.trials.len(), 1);
    let trial = &report.trials[0];
    assert_eq!(trial.intermediate.len(), 1);
    assert!(trial.value.unwrap() >= 0.0 && trial.value.unwrap() <= 1.0);
    assert!(report.best_trial().is_some());
}

//! Ground-truth manifest loading.
//!
//! The manifest is a CSV with an `image` column followed by one column per
//! lesion class holding a one-hot encoding (`1.0` in exactly one column).
//! Rows that cannot be resolved to a usable labeled image are skipped with a
//! warning rather than aborting the whole load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::labels::{LesionClass, NUM_CLASSES};
use crate::utils::error::{Error, Result};

/// One labeled image from the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file on disk.
    pub path: PathBuf,

    /// Ground-truth lesion class.
    pub label: LesionClass,
}

/// Load the ground-truth manifest, resolving image ids against `image_dir`.
///
/// Returns an error if the CSV cannot be opened, its header does not carry
/// the expected class columns, or no usable rows remain after filtering.
pub fn load_manifest(csv_path: &Path, image_dir: &Path) -> Result<Vec<Sample>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|e| Error::Manifest(format!("failed to open {}: {}", csv_path.display(), e)))?;

    // Map header columns to class indices so column order in the file does
    // not have to match the enum order.
    let headers = reader
        .headers()
        .map_err(|e| Error::Manifest(format!("failed to read header: {}", e)))?
        .clone();

    let image_column = headers
        .iter()
        .position(|name| name == "image")
        .ok_or_else(|| Error::Manifest("header has no `image` column".into()))?;

    let mut class_columns: Vec<(usize, LesionClass)> = Vec::with_capacity(NUM_CLASSES);
    for (col, name) in headers.iter().enumerate() {
        if let Some(class) = LesionClass::from_code(name) {
            class_columns.push((col, class));
        }
    }
    if class_columns.len() != NUM_CLASSES {
        return Err(Error::Manifest(format!(
            "expected {} class columns in header, found {}",
            NUM_CLASSES,
            class_columns.len()
        )));
    }

    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| Error::Manifest(format!("failed to read row {}: {}", row_idx + 1, e)))?;

        let image_id = match record.get(image_column) {
            Some(id) if !id.is_empty() => id,
            _ => {
                warn!(row = row_idx + 1, "skipping row with empty image id");
                skipped += 1;
                continue;
            }
        };

        // The one-hot row must have exactly one column set to 1.0.
        let mut label = None;
        let mut malformed = false;
        for &(col, class) in &class_columns {
            let raw = record.get(col).unwrap_or("");
            let value: f32 = match raw.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    malformed = true;
                    break;
                }
            };
            if value == 1.0 {
                if label.is_some() {
                    malformed = true;
                    break;
                }
                label = Some(class);
            }
        }

        let label = match (malformed, label) {
            (false, Some(label)) => label,
            _ => {
                warn!(
                    row = row_idx + 1,
                    image = image_id,
                    "skipping row with malformed one-hot label"
                );
                skipped += 1;
                continue;
            }
        };

        let path = image_dir.join(format!("{}.jpg", image_id));
        if !path.is_file() {
            warn!(image = image_id, "skipping row, image file not found");
            skipped += 1;
            continue;
        }

        samples.push(Sample { path, label });
    }

    if samples.is_empty() {
        return Err(Error::Manifest(format!(
            "no usable samples in {} ({} rows skipped)",
            csv_path.display(),
            skipped
        )));
    }

    info!(
        total = samples.len(),
        skipped,
        "loaded manifest from {}",
        csv_path.display()
    );

    Ok(samples)
}

/// Count samples per class, indexed by class index.
pub fn class_distribution(samples: &[Sample]) -> Vec<usize> {
    let mut counts = vec![0usize; NUM_CLASSES];
    for sample in samples {
        counts[sample.label.index()] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &Path, rows: &[&str]) -> PathBuf {
        let csv_path = dir.join("ground_truth.csv");
        let mut contents = String::from("image,MEL,NV,BCC,AKIEC,BKL,DF,VASC\n");
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        fs::write(&csv_path, contents).unwrap();
        csv_path
    }

    fn touch_image(dir: &Path, id: &str) {
        // A real decode never happens during manifest loading, existence is
        // all that is checked.
        fs::write(dir.join(format!("{}.jpg", id)), b"stub").unwrap();
    }

    #[test]
    fn test_load_skips_missing_and_malformed_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        touch_image(dir, "img_ok");
        touch_image(dir, "img_two_hot");
        touch_image(dir, "img_zero_hot");

        let csv_path = write_manifest(
            dir,
            &[
                "img_ok,0.0,1.0,0.0,0.0,0.0,0.0,0.0",
                "img_missing,1.0,0.0,0.0,0.0,0.0,0.0,0.0",
                "img_two_hot,1.0,1.0,0.0,0.0,0.0,0.0,0.0",
                "img_zero_hot,0.0,0.0,0.0,0.0,0.0,0.0,0.0",
            ],
        );

        let samples = load_manifest(&csv_path, dir).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, LesionClass::Nv);
        assert!(samples[0].path.ends_with("img_ok.jpg"));
    }

    #[test]
    fn test_image_column_found_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        touch_image(dir, "img_last");

        // The image column does not have to come first.
        let csv_path = dir.join("reordered.csv");
        fs::write(
            &csv_path,
            "MEL,NV,BCC,AKIEC,BKL,DF,VASC,image\n0.0,0.0,0.0,0.0,1.0,0.0,0.0,img_last\n",
        )
        .unwrap();

        let samples = load_manifest(&csv_path, dir).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, LesionClass::Bkl);
    }

    #[test]
    fn test_missing_image_column_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let csv_path = tmp.path().join("no_id.csv");
        fs::write(
            &csv_path,
            "MEL,NV,BCC,AKIEC,BKL,DF,VASC\n1.0,0.0,0.0,0.0,0.0,0.0,0.0\n",
        )
        .unwrap();
        assert!(matches!(
            load_manifest(&csv_path, tmp.path()),
            Err(Error::Manifest(_))
        ));
    }

    #[test]
    fn test_load_errors_when_nothing_usable() {
        let tmp = tempfile::tempdir().unwrap();
        let csv_path = write_manifest(tmp.path(), &["img_gone,1.0,0.0,0.0,0.0,0.0,0.0,0.0"]);
        let result = load_manifest(&csv_path, tmp.path());
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_class_distribution() {
        let samples = vec![
            Sample {
                path: PathBuf::from("a.jpg"),
                label: LesionClass::Nv,
            },
            Sample {
                path: PathBuf::from("b.jpg"),
                label: LesionClass::Nv,
            },
            Sample {
                path: PathBuf::from("c.jpg"),
                label: LesionClass::Mel,
            },
        ];
        let counts = class_distribution(&samples);
        assert_eq!(counts[LesionClass::Nv.index()], 2);
        assert_eq!(counts[LesionClass::Mel.index()], 1);
        assert_eq!(counts.iter().sum::<usize>(), 3);
    }
}

//! End-to-end batch runs with the software rasterizer.

use std::path::Path;

use image::{Rgb, RgbImage};
use mesh_overlay::config::OverlayConfig;
use mesh_overlay::{OverlayPipeline, SoftwareRasterizer};

const BACKGROUND: [u8; 3] = [40, 40, 40];

/// Two unit-sized triangles forming a square in the z = 0 plane.
const SQUARE: &str = "\
# square
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
f 1 2 3 4
";

fn write_image(dir: &Path, stem: &str) {
    RgbImage::from_pixel(64, 48, Rgb(BACKGROUND))
        .save(dir.join(format!("{}.png", stem)))
        .unwrap();
}

fn write_subject(config: &OverlayConfig, stem: &str, id: &str, translation: [f32; 3]) {
    let mesh_dir = config.mesh_root().join(stem);
    let results_dir = config.results_root().join(stem);
    std::fs::create_dir_all(&mesh_dir).unwrap();
    std::fs::create_dir_all(&results_dir).unwrap();
    std::fs::write(mesh_dir.join(format!("{}.obj", id)), SQUARE).unwrap();
    let params = serde_json::json!({
        "camera_center": [[32.0, 24.0]],
        "camera_translation": [translation],
        "focal_length": 50.0,
    });
    std::fs::write(results_dir.join(format!("{}.json", id)), params.to_string()).unwrap();
}

fn config_in(root: &Path) -> OverlayConfig {
    let config = OverlayConfig {
        data_dir: root.join("fit"),
        images_dir: root.join("images"),
        output_dir: root.join("overlays"),
        ..OverlayConfig::default()
    };
    std::fs::create_dir_all(&config.images_dir).unwrap();
    config
}

#[test]
fn renders_subject_over_photo() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_image(&config.images_dir, "street");
    write_subject(&config, "street", "000", [0.0, 0.0, 10.0]);

    let pipeline = OverlayPipeline::new(config.clone(), Box::new(SoftwareRasterizer::new()));
    let report = pipeline.run().unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());

    let result = image::open(config.output_dir.join("street_all.png")).unwrap().to_rgb8();
    assert_eq!(result.dimensions(), (64, 48));
    assert_ne!(result.get_pixel(32, 24).0, BACKGROUND);
    assert_eq!(result.get_pixel(0, 0).0, BACKGROUND);
    assert_eq!(result.get_pixel(63, 47).0, BACKGROUND);
}

#[test]
fn mixed_batch_reports_each_image() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.copy_empty = true;
    config.save_per_subject = true;

    write_image(&config.images_dir, "a_fitted");
    write_image(&config.images_dir, "b_empty");
    write_image(&config.images_dir, "c_broken");
    write_subject(&config, "a_fitted", "left", [3.0, 0.0, 10.0]);
    write_subject(&config, "a_fitted", "right", [-3.0, 0.0, 12.0]);
    write_subject(&config, "c_broken", "000", [0.0, 0.0, 10.0]);
    std::fs::write(config.mesh_root().join("c_broken").join("000.obj"), "f 1 2 3\n").unwrap();

    let pipeline = OverlayPipeline::new(config.clone(), Box::new(SoftwareRasterizer::new()));
    let report = pipeline.run().unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped_empty, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "c_broken.png");

    let out = &config.output_dir;
    assert!(out.join("a_fitted_left.png").is_file());
    assert!(out.join("a_fitted_right.png").is_file());
    assert!(out.join("a_fitted_all.png").is_file());
    assert!(out.join("b_empty.png").is_file());
    assert!(!out.join("c_broken_all.png").exists());

    // Each subject lands on its own side of the frame; the combined image shows both.
    let left = image::open(out.join("a_fitted_left.png")).unwrap().to_rgb8();
    let all = image::open(out.join("a_fitted_all.png")).unwrap().to_rgb8();
    let covered = |img: &RgbImage| img.pixels().filter(|p| p.0 != BACKGROUND).count();
    assert!(covered(&left) > 0);
    assert!(covered(&all) > covered(&left));
}

use std::fs;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

const COLORS: [[u8; 3]; 4] = [[220, 40, 40], [40, 220, 40], [40, 40, 220], [230, 230, 230]];
const CAPTIONS: [&str; 4] =
    ["a red cat on a sofa", "a green field with horses", "a cat swimming in the sea", "white snow"];

/// 生成 4 张纯色截图和对应的清单文件
#[fixture]
fn dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("thumbs")).unwrap();
    let mut manifest = String::new();
    for (i, [r, g, b]) in COLORS.into_iter().enumerate() {
        let path = dir.path().join("thumbs").join(format!("{i}.png"));
        RgbaImage::from_pixel(32, 32, Rgba([r, g, b, 255])).save(&path).unwrap();
        let record = serde_json::json!({
            "movie_name": "movie",
            "frame_pos": i * 10,
            "thumbnail_path": path,
            "caption": CAPTIONS[i],
            "labels": if i % 2 == 0 { vec!["cat"] } else { vec!["landscape"] },
        });
        manifest.push_str(&record.to_string());
        manifest.push('\n');
    }
    fs::write(dir.path().join("manifest.jsonl"), manifest).unwrap();
    dir
}

fn thumbnail(dataset: &TempDir, i: usize) -> String {
    dataset.path().join("thumbs").join(format!("{i}.png")).to_string_lossy().to_string()
}

#[rstest]
fn add_and_search_image(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;

    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path().join("manifest.jsonl")).success();

    let target = thumbnail(&dataset, 2);
    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--image", &target, "--count", "1")
        .success()
        .stdout(predicate::str::contains(target.as_str()))
        .stdout(predicate::str::contains(thumbnail(&dataset, 0)).not());

    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--image", &target, "--mask", "--output-format", "json")
        .success()
        .stdout(predicate::str::contains(r#""movie_name": "movie""#));

    Ok(())
}

#[rstest]
fn add_is_idempotent(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;

    // 目录中的清单文件也会被扫描
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path()).success();
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path()).success();

    cargo_run!("framesearch", "-c", conf_dir.path(), "info", "--json")
        .success()
        .stdout(predicate::str::contains(r#""vectors": 4"#))
        .stdout(predicate::str::contains(r#""entries": 4"#));

    Ok(())
}

#[rstest]
fn search_text(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path()).success();

    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--text", "cat, red")
        .success()
        .stdout(predicate::str::contains(thumbnail(&dataset, 0)))
        .stdout(predicate::str::contains(thumbnail(&dataset, 2)).not());

    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--text", "white snow", "--embedding", "--top-n", "1")
        .success()
        .stdout(predicate::str::contains(thumbnail(&dataset, 3)))
        .stdout(predicate::str::contains(thumbnail(&dataset, 1)).not());

    Ok(())
}

#[rstest]
fn mismatched_layout(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path()).success();

    cargo_run!("framesearch", "-c", conf_dir.path(), "info", "--hist-bins", "27")
        .failure()
        .stderr(predicate::str::contains("特征库损坏"));

    cargo_run!("framesearch", "-c", conf_dir.path(), "info", "--hist-bins", "10").failure();

    Ok(())
}

#[rstest]
fn layout_from_store(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path(), "--hist-bins", "27", "--color-space", "rgb")
        .success();

    cargo_run!("framesearch", "-c", conf_dir.path(), "info")
        .success()
        .stdout(predicate::str::contains("4x4x27"))
        .stdout(predicate::str::contains("Rgb"));

    let target = thumbnail(&dataset, 1);
    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--image", &target, "--count", "1")
        .success()
        .stdout(predicate::str::contains(target.as_str()));

    cargo_run!("framesearch", "-c", conf_dir.path(), "search", "--image", &target, "--color-space", "lab")
        .failure()
        .stderr(predicate::str::contains("特征库损坏"));

    Ok(())
}

#[rstest]
fn export_histograms(dataset: TempDir) -> Result<()> {
    let conf_dir = TempDir::new()?;
    let output = conf_dir.path().join("out.npy");
    cargo_run!("framesearch", "-c", conf_dir.path(), "add", dataset.path()).success();
    cargo_run!("framesearch", "-c", conf_dir.path(), "export", &output).success();
    assert!(fs::metadata(&output)?.len() > 4 * 4 * 4 * 64 * 4);
    Ok(())
}

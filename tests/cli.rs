use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn headless() -> Command {
    let mut cmd = Command::cargo_bin("tank-battle").expect("binary exists");
    cmd.arg("--headless");
    cmd
}

#[test]
fn headless_replays_keys_and_prints_final_state() {
    let mut cmd = headless();
    cmd.args(["--keys", "ArrowUp,ArrowUp,w,x", "--frames", "5"]);
    cmd.assert()
        .success()
        .stdout(contains("The Key \"ArrowUp\" is down."))
        .stdout(contains("The Key \"W\" is down."))
        .stdout(contains("Final state after 5 frames:"))
        .stdout(contains(" - 4 instances, 0 projectiles in flight"))
        .stdout(contains(" - Body pos=(0.20, "))
        .stdout(contains(" - Barrel pos=(0.20, 0.20, 0.00) rot=(0.00, 0.00, 0.05)"));
}

#[test]
fn pause_halts_the_headless_run() {
    let mut cmd = headless();
    cmd.args(["--keys", "p", "--frames", "50"]);
    cmd.assert()
        .success()
        .stdout(contains("The Key \"P\" is down."))
        .stdout(contains("Final state after 1 frames (paused):"));
}

#[test]
fn json_output_reports_projectiles() {
    let mut cmd = headless();
    cmd.args(["--keys", "Space", "--frames", "2", "--json"]);
    let output = cmd.output().expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let json_start = stdout.find('{').expect("json object");
    let state: serde_json::Value = serde_json::from_str(&stdout[json_start..]).expect("valid json");
    assert_eq!(state["frames"], 2);
    assert_eq!(state["projectiles"], 1);
    assert_eq!(state["instances"], 5);
    assert_eq!(state["paused"], false);
}

#[test]
fn scene_file_sets_up_the_battlefield() {
    let scene = r#"<scene>
  <controls><move_step>0.5</move_step></controls>
  <object><name>Rock</name><position>1 0 1</position></object>
  <object><name>Rock2</name><position>-1 0 1</position></object>
  <object><name>Hull</name><role>body</role></object>
  <object><name>Top</name><role>turret</role><position>0 0.6 0</position></object>
  <object><name>Gun</name><role>barrel</role><mesh>gun.obj</mesh></object>
  <object><name>Shot</name><role>projectile</role><mesh>builtin:shell</mesh></object>
</scene>
"#;
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("gun.obj"),
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
    )
    .expect("write mesh");
    let scene_path = dir.path().join("scene.xml");
    std::fs::write(&scene_path, scene).expect("write scene");

    let mut cmd = headless();
    cmd.arg("--scene")
        .arg(&scene_path)
        .args(["--keys", "ArrowUp", "--frames", "1"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 6 objects"))
        .stdout(contains(" - 5 instances, 0 projectiles in flight"))
        .stdout(contains(" - Body pos=(0.50, 0.00, 0.00)"));
}

#[test]
fn invalid_scene_is_reported() {
    let mut scene = NamedTempFile::new().expect("temp scene");
    scene
        .write_all(b"<scene><object><name>Lonely</name><role>body</role></object></scene>")
        .expect("write scene");

    let mut cmd = headless();
    cmd.arg("--scene").arg(scene.path());
    cmd.assert()
        .failure()
        .stderr(contains("failed to parse scene").and(contains("Turret")));
}

#[test]
fn unknown_flags_fail() {
    let mut cmd = Command::cargo_bin("tank-battle").expect("binary exists");
    cmd.arg("--warp-drive");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --warp-drive"));
}

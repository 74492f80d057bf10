//! End-to-end scenarios against the built `vigild` binary (spec §8
//! "End-to-end scenarios"), driven through `assert_cmd` the way the
//! teacher's root `oj-specs` package drives its own binary.

use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use serial_test::serial;
use tempfile::tempdir;

fn vigild() -> Command {
    Command::cargo_bin("vigild").expect("vigild binary built")
}

fn free_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}

fn write(path: &Path, contents: &str) {
    let mut file = std::fs::File::create(path).expect("create control file");
    file.write_all(contents.as_bytes()).expect("write control file");
}

#[test]
fn syntax_check_accepts_a_valid_control_file_and_rejects_a_bad_one() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.hcl");
    write(&good, r#"service "db" { kind = "process" }"#);

    vigild().args(["-c", good.to_str().unwrap(), "-t"]).assert().success();

    let bad = dir.path().join("bad.hcl");
    write(&bad, r#"service "db" { kind = "not-a-kind" }"#);

    vigild().args(["-c", bad.to_str().unwrap(), "-t"]).assert().failure().code(1);
}

#[test]
fn identity_token_is_stable_then_resettable() {
    let dir = tempdir().unwrap();
    let id_file = dir.path().join("id");

    let first = vigild().args(["--id-file", id_file.to_str().unwrap(), "--id"]).assert().success();
    let first_id = String::from_utf8(first.get_output().stdout.clone()).unwrap();

    let second = vigild().args(["--id-file", id_file.to_str().unwrap(), "--id"]).assert().success();
    let second_id = String::from_utf8(second.get_output().stdout.clone()).unwrap();
    assert_eq!(first_id, second_id, "identity token must survive across invocations");

    let reset = vigild().args(["--id-file", id_file.to_str().unwrap(), "--resetid"]).assert().success();
    let reset_id = String::from_utf8(reset.get_output().stdout.clone()).unwrap();
    assert_ne!(first_id, reset_id, "--resetid must mint a fresh token");
}

#[test]
fn hash_flag_prints_sha1_and_md5_of_the_named_file() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("payload");
    write(&target, "vigil");

    let output = vigild().args(["-H", target.to_str().unwrap()]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("SHA1("), "expected a SHA1 line, got: {stdout}");
    assert!(stdout.contains("MD5("), "expected an MD5 line, got: {stdout}");
}

#[test]
fn procmatch_finds_the_running_test_process() {
    // An empty pattern matches every process (spec §6 `procmatch <pattern>`),
    // so the harness process itself is always in the result.
    vigild().args(["procmatch", ""]).assert().success().stdout(predicates::str::is_empty().not());
}

#[test]
#[serial]
fn daemon_reports_a_network_service_as_up_over_its_http_surface() {
    // Keep the listener alive for the whole test: the daemon's port rule
    // polls it every cycle.
    let target = TcpListener::bind("127.0.0.1:0").expect("bind a target listener");
    let target_addr = target.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in target.incoming() {
            drop(stream);
        }
    });

    let dir = tempdir().unwrap();
    let control_file = dir.path().join("vigilrc");
    write(
        &control_file,
        &format!(
            r#"
            service "probe" {{
              kind = "network"
              path = "{target_addr}"

              rule {{
                kind = "port"
                if = ">"

                then {{ kind = "ignore" }}
                otherwise {{ kind = "ignore" }}
              }}
            }}
            "#
        ),
    );

    let http_addr = free_addr();
    let pid_file = dir.path().join("vigil.pid");
    let state_file = dir.path().join("vigil.state");
    let identity_file = dir.path().join("vigil.id");
    let queue_dir = dir.path().join("events");

    let mut daemon = std::process::Command::new(assert_cmd::cargo::cargo_bin("vigild"))
        .args([
            "-c",
            control_file.to_str().unwrap(),
            "-d",
            "1",
            "-I",
            "-p",
            pid_file.to_str().unwrap(),
            "-s",
            state_file.to_str().unwrap(),
            "--id-file",
            identity_file.to_str().unwrap(),
            "--queue-dir",
            queue_dir.to_str().unwrap(),
            "--http",
            &http_addr.to_string(),
        ])
        .spawn()
        .expect("spawn vigild daemon");

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut last_stdout = String::new();
    let up = loop {
        if Instant::now() > deadline {
            break false;
        }
        let output = vigild().args(["--http", &http_addr.to_string(), "status"]).output();
        if let Ok(output) = output {
            last_stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            if last_stdout.contains("probe") && last_stdout.contains("running") {
                break true;
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    };

    vigild().args(["--http", &http_addr.to_string(), "quit"]).output().ok();
    let _ = daemon.wait();

    assert!(up, "expected the probe service to report running, last status:\n{last_stdout}");
}

//! Driver integration tests: flag handling, exit codes, and error output.

use std::process::Command;

fn basalt() -> Command {
    Command::new(env!("CARGO_BIN_EXE_basalt"))
}

#[test]
fn inline_program_success() {
    let out = basalt()
        .args(["-c", "print(1 + 2)"])
        .output()
        .expect("run basalt");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "3\n");
}

#[test]
fn evaluation_error_exits_one_with_backtrace() {
    let out = basalt()
        .args(["-c", "x = 1 // 0"])
        .output()
        .expect("run basalt");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Traceback (most recent call last):"), "{}", stderr);
    assert!(stderr.contains("Error: floored division by zero"), "{}", stderr);
    assert!(stderr.contains("cmdline:1:"), "{}", stderr);
}

#[test]
fn showenv_prints_public_globals() {
    let out = basalt()
        .args(["--showenv", "-c", "x = 1\n_private = 2\ny = \"mur\" * 2"])
        .output()
        .expect("run basalt");
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("x = 1"), "{}", stderr);
    assert!(stderr.contains("y = \"murmur\""), "{}", stderr);
    assert!(!stderr.contains("_private"), "{}", stderr);
}

#[test]
fn dialect_flags_reach_the_resolver() {
    // Rejected without the gate...
    let out = basalt()
        .args(["-c", "x = 1.5"])
        .output()
        .expect("run basalt");
    assert_eq!(out.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("allow_float"),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );

    // ...accepted with it.
    let out = basalt()
        .args(["--float", "-c", "print(3 / 2)"])
        .output()
        .expect("run basalt");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "1.5\n");
}

#[test]
fn more_than_one_file_is_an_error() {
    let out = basalt()
        .args(["a.bst", "b.bst"])
        .output()
        .expect("run basalt");
    assert_eq!(out.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("want at most one file"),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn executes_files_and_resolves_loads() {
    let dir = std::env::temp_dir().join(format!("basalt-cli-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("lib.bst"), "answer = 42\n").expect("write lib");
    std::fs::write(
        dir.join("main.bst"),
        "load(\"lib.bst\", \"answer\")\nprint(answer)\n",
    )
    .expect("write main");

    let out = basalt()
        .arg(dir.join("main.bst"))
        .output()
        .expect("run basalt");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout), "42\n");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn profile_flag_writes_a_profile() {
    let path = std::env::temp_dir().join(format!("basalt-profile-{}.bin", std::process::id()));
    let out = basalt()
        .args(["--recursion", "--profile"])
        .arg(&path)
        .args(["-c", "def f(n):\n    return 1 if n < 2 else f(n - 1) + f(n - 2)\nf(18)"])
        .output()
        .expect("run basalt");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let data = std::fs::read(&path).expect("profile written");
    assert!(data.starts_with(b"BPRF"), "bad profile header");
    let _ = std::fs::remove_file(&path);
}

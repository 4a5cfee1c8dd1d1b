//! End-to-end tests for the workshell binary

use std::io::Write;
use std::process::{Command, Output};

fn workshell(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_workshell"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to start workshell")
}

fn script(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_command_string() {
    let out = workshell(&["-c", "echo hello; echo oops >&2; exit 3"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
    assert_eq!(String::from_utf8_lossy(&out.stderr), "oops\n");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_script_file_with_args() {
    let file = script("echo \"$# $1 $2\"\nfor a in \"$@\"; do echo \"<$a>\"; done\n");
    let path = file.path().to_str().unwrap();
    let out = workshell(&[path, "one", "two words"]);
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "2 one two words\n<one>\n<two words>\n"
    );
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_syntax_error_exit_code() {
    let file = script("echo fine\nif true; then\n");
    let out = workshell(&[file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());

    let out = workshell(&["-c", "for x in a; echo"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("sh: -c: line 1: "));
}

#[test]
fn test_json_output() {
    let out = workshell(&["--json", "-c", "echo hi; false"]);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["stdout"], "hi\n");
    assert_eq!(value["stderr"], "");
    assert_eq!(value["code"], 1);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_env_and_errexit_flags() {
    let out = workshell(&["--env", "NAME=ws", "-e", "-c", "echo $NAME; false; echo no"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout), "ws\n");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_host_filesystem_is_not_visible() {
    let out = workshell(&["-c", "cat /etc/hostname"]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&out.stderr),
        "cat: /etc/hostname: No such file or directory\n"
    );
}

#[test]
fn test_loop_limit_flag() {
    let out = workshell(&["--max-loop-iterations", "5", "-c", "while true; do :; done"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("maximum loop iterations exceeded"));
}

#[test]
fn test_verbose_logs_lifecycle_to_stderr() {
    let out = workshell(&["-v", "-c", "echo hi"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hi\n");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("running command string"), "{}", stderr);
    assert!(stderr.contains("finished"), "{}", stderr);

    let quiet = workshell(&["-c", "echo hi"]);
    assert!(quiet.stderr.is_empty());
}

use std::io::Write;
use std::process::{Command, Output};

fn isngen() -> Command {
    Command::new(env!("CARGO_BIN_EXE_isngen"))
}

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".isn").tempfile().expect("temp file");
    f.write_all(source.as_bytes()).expect("write script");
    f
}

fn run_with(source: &str, args: &[&str]) -> Output {
    let f = script(source);
    isngen().arg(f.path()).args(args).output().expect("failed to run isngen")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const ADD: &str = "\
func Add(number, ?number): number
begin Main
  nr 1
  nr 2
  call Add 2
  echo 1
end
begin Add
  load local 0 number
  load local 1 number
  op +
  return
end
";

// --- listing ---

#[test]
fn listing_by_default() {
    let out = run_with(ADD, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Add (dfunc 0, Normal)"), "{text}");
    assert!(text.contains("Main (dfunc 1, Normal)"), "{text}");
    assert!(text.contains("OPNR +"), "{text}");
    assert!(text.contains("DCALL Add(2) [0]"), "{text}");
    assert!(text.find("Add (").unwrap() < text.find("Main (").unwrap(), "callee first:\n{text}");
}

#[test]
fn profile_compile_type() {
    let out = run_with("begin Main\nprofile\nnr 1\ndrop\nend\n", &["--compile-type", "profile"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Main (dfunc 0, Profile)"), "{text}");
    assert!(text.contains("PROFILE START"), "{text}");
    assert!(text.contains("PROFILE END"), "{text}");
}

// --- json ---

#[test]
fn emit_json() {
    let out = run_with(ADD, &["--emit", "json"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    let funcs = v.as_array().expect("array of functions");
    assert_eq!(funcs.len(), 2);
    assert_eq!(funcs[0]["name"], "Add");
    assert_eq!(funcs[1]["name"], "Main");
    assert_eq!(funcs[1]["compile_type"], "normal");
}

// --- errors ---

#[test]
fn type_error_is_reported_with_location() {
    let out = run_with("begin Main\nstr \"a\"\nnr 1\nop +\nend\n", &["--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[ISN-T001]: wrong argument type for +"), "{err}");
    assert!(err.contains("--> 4:1"), "{err}");
    assert!(err.contains("note: in function 'Main'"), "{err}");
    assert!(stdout(&out).is_empty());
}

#[test]
fn json_errors() {
    let out = run_with("begin Main\nnr 1\nnr 2\ncmp is\nend\n", &["--json-errors"]);
    assert!(!out.status.success());
    let line = stderr(&out).lines().last().unwrap_or_default().to_string();
    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert_eq!(v["code"], "ISN-T004");
    assert_eq!(v["labels"][0]["line"], 4);
    assert_eq!(v["suggestion"], "compare values with '==' instead");
}

#[test]
fn stack_underflow_is_a_diagnostic() {
    let out = run_with("begin Main\nnr 1\nop +\nend\n", &["--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[ISN-S007]: stack underflow: needs 2 value(s), the stack holds 1"), "{err}");
    assert!(err.contains("--> 3:1"), "{err}");
    assert!(!err.contains("panicked"), "{err}");
}

#[test]
fn missing_file() {
    let out = isngen().arg("/nonexistent/script.isn").arg("--no-color").output().expect("failed to run isngen");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot read"), "{}", stderr(&out));
}

#[test]
fn script_is_required() {
    let out = isngen().output().expect("failed to run isngen");
    assert!(!out.status.success());
}

// --- explain ---

#[test]
fn explain_known_code() {
    let out = isngen().args(["--explain", "ISN-A002"]).output().expect("failed to run isngen");
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.starts_with("## ISN-A002: not enough arguments"), "{text}");
}

#[test]
fn explain_unknown_code() {
    let out = isngen().args(["--explain", "ISN-Z999"]).output().expect("failed to run isngen");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown error code"));
}

mod common;

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use common::{setup_test_env, FALLBACK};

fn run_faq(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_faq");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run faq binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ask_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["ask"];
    full.extend_from_slice(args);
    full.push("--json");
    let (stdout, stderr, success) = run_faq(config_path, &full);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad json {:?}: {}", stdout, e))
}

#[test]
fn test_check_reports_contexts() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_faq(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("GENERAL"));
    assert!(stdout.contains("GOLDCARD"));
    assert!(stdout.contains("gold card"));
    assert!(stdout.contains("OK"));
}

#[test]
fn test_ask_exact_question() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, _, success) = run_faq(&config_path, &["ask", "What are your opening hours?"]);
    assert!(success);
    assert!(stdout.contains("We are open 9am to 5pm on weekdays."));
    assert!(stdout.contains("context: GENERAL"));
}

#[test]
fn test_ask_json_result() {
    let (_tmp, config_path) = setup_test_env("");

    let result = ask_json(&config_path, &["How do I open an account?"]);
    assert_eq!(result["answer"], "Visit any branch with photo ID.");
    assert_eq!(result["matched_question"], "How do I open an account?");
    assert_eq!(result["context"], "GENERAL");
    assert_eq!(result["is_fallback"], false);
    assert!(result["score"].as_f64().unwrap() > 0.99);
}

#[test]
fn test_ask_trigger_switches_context() {
    let (_tmp, config_path) = setup_test_env("");

    let result = ask_json(&config_path, &["Gold Card: how do I report a lost card?"]);
    assert_eq!(result["context"], "GOLDCARD");
    assert_eq!(result["matched_question"], "How do I report a lost card?");
}

#[test]
fn test_ask_explicit_context() {
    let (_tmp, config_path) = setup_test_env("");

    let result = ask_json(&config_path, &["What is the annual fee?", "--context", "GOLDCARD"]);
    assert_eq!(result["context"], "GOLDCARD");
    assert_eq!(
        result["answer"],
        "The Gold Card has no annual fee in the first year."
    );
}

#[test]
fn test_ask_unrelated_question_falls_back() {
    let (_tmp, config_path) = setup_test_env("");

    let result = ask_json(&config_path, &["zebra quantum xylophone"]);
    assert_eq!(result["is_fallback"], true);
    assert_eq!(result["answer"], FALLBACK);
    assert_eq!(result["context"], "GENERAL");
}

#[test]
fn test_ask_unknown_context_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_faq(&config_path, &["ask", "hi", "--context", "MORTGAGE"]);
    assert!(!success);
    assert!(stderr.contains("Unknown context"));
}

#[test]
fn test_custom_fallback_answer() {
    let (_tmp, config_path) = setup_test_env(
        r#"[matcher]
unknown_threshold = 0.99
fallback_answer = "Please call us."
"#,
    );

    let result = ask_json(&config_path, &["opening hours please"]);
    assert_eq!(result["is_fallback"], true);
    assert_eq!(result["answer"], "Please call us.");
    assert_eq!(result["matched_question"], "What are your opening hours?");
}

#[test]
fn test_chat_keeps_context_between_messages() {
    let (_tmp, config_path) = setup_test_env("");

    let mut child = Command::new(env!("CARGO_BIN_EXE_faq"))
        .arg("--config")
        .arg(&config_path)
        .arg("chat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(
            b"What are your opening hours?\nI have a gold card\nHow do I report a lost card?\n/quit\n",
        )
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let replies: Vec<&str> = stdout
        .split("> ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    assert_eq!(replies.len(), 3, "replies: {:?}", replies);
    assert_eq!(replies[0], "[GENERAL] We are open 9am to 5pm on weekdays.");
    assert!(replies[1].starts_with("[GOLDCARD]"));
    assert_eq!(
        replies[2],
        "[GOLDCARD] Call the Gold Card hotline, open around the clock."
    );
}

#[test]
fn test_snapshot_written_and_reused() {
    let (tmp, config_path) = setup_test_env(
        r#"[snapshot]
path = "../data/index.json"
"#,
    );
    let snapshot = tmp.path().join("data/index.json");

    let (stdout, stderr, success) = run_faq(&config_path, &["snapshot"]);
    assert!(success, "snapshot failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Wrote 4 entries (1024 dims)"));
    assert!(snapshot.exists());

    let (_, stderr, success) = run_faq(&config_path, &["check"]);
    assert!(success);
    assert!(stderr.contains("restored embedding snapshot"));
}

#[test]
fn test_snapshot_without_section_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_faq(&config_path, &["snapshot"]);
    assert!(!success);
    assert!(stderr.contains("No [snapshot] section"));
}

#[test]
fn test_undeclared_context_in_knowledge_fails() {
    let (tmp, config_path) = setup_test_env("");
    std::fs::write(
        tmp.path().join("config/knowledge.toml"),
        r#"
[[faq]]
context = "MORTGAGE"
question = "What are the rates?"
answer = "Call us."
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_faq(&config_path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("MORTGAGE"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run_faq(&tmp.path().join("nope.toml"), &["check"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_disabled_provider_fails() {
    let (tmp, config_path) = setup_test_env("");
    let content = std::fs::read_to_string(&config_path)
        .unwrap()
        .replace("provider = \"hashed\"", "provider = \"disabled\"");
    std::fs::write(&config_path, content).unwrap();
    let _ = tmp;

    let (_, _, success) = run_faq(&config_path, &["ask", "hi"]);
    assert!(!success);
}

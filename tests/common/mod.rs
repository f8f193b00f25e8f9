#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const FALLBACK: &str = "Sorry, I can't help with that yet. Try to ask another question!";

pub const KNOWLEDGE: &str = r#"
[[faq]]
context = "GENERAL"
question = "How do I open an account?"
answer = "Visit any branch with photo ID."

[[faq]]
context = "GENERAL"
question = "What are your opening hours?"
answer = "We are open 9am to 5pm on weekdays."

[[faq]]
context = "GOLDCARD"
question = "What is the annual fee?"
answer = "The Gold Card has no annual fee in the first year."

[[faq]]
context = "GOLDCARD"
question = "How do I report a lost card?"
answer = "Call the Gold Card hotline, open around the clock."
"#;

/// Write a config using the hashed provider plus the shared knowledge base
/// into a fresh temp dir. `extra` is appended to the config verbatim.
pub fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(config_dir.join("knowledge.toml"), KNOWLEDGE).unwrap();

    let config_content = format!(
        r#"[knowledge]
path = "knowledge.toml"

[embedding]
provider = "hashed"
dims = 1024

[audit]
sink = "disabled"

{}
"#,
        extra
    );
    let config_path = config_dir.join("faq.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

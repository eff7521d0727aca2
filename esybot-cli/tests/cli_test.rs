use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{Builder, NamedTempFile};

const BOT: &str = r#"
[BOT]
token = 123456:secret-token
name = Counter

[VARS]
count = 0

[START]
text = Count: $count
button1 = Add|add

[add]
inc = count
text = Pressed
"#;

fn esybot_cmd() -> Command {
    let mut cmd = Command::cargo_bin("esybot").unwrap();
    cmd.env_remove("ESYBOT_TOKEN");
    cmd
}

fn bot_file(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_check_prints_summary() {
    let file = bot_file(BOT, ".ini");
    esybot_cmd()
        .arg("check")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot: Counter v1.0.0"))
        .stdout(predicate::str::contains("Handlers: 2"))
        .stdout(predicate::str::contains("******oken"))
        // The token should never be printed in full
        .stdout(predicate::str::contains("secret-token").not());
}

#[test]
fn test_check_json() {
    let file = bot_file(BOT, ".ini");
    esybot_cmd()
        .args(["check", "--json"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"handlers\""))
        .stdout(predicate::str::contains("START:buttons"));
}

#[test]
fn test_check_reports_config_errors() {
    let file = bot_file("[VARS]\nx = 1\n", ".ini");
    esybot_cmd()
        .arg("check")
        .arg(file.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing required bot token"));

    let file = bot_file("[BOT]\ntoken = t\n[x]\npython {\n  a = 1\n", ".ini");
    esybot_cmd()
        .arg("check")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 4"));
}

#[test]
fn test_sim_session() {
    let file = bot_file(BOT, ".ini");
    esybot_cmd()
        .arg("sim")
        .arg(file.path())
        .write_stdin("/start\n!cb add\n!vars\n!quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("bot> Count: 0"))
        .stdout(predicate::str::contains("[Add]"))
        .stdout(predicate::str::contains("bot (edit #1)> Pressed"))
        .stdout(predicate::str::contains("count = 1"));
}

#[test]
fn test_run_without_token_fails() {
    let file = bot_file("config:\n  token: \"\"\n", ".yaml");
    esybot_cmd()
        .arg("run")
        .arg(file.path())
        .assert()
        .failure()
        .code(1);
}

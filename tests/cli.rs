//! Tests for the strata binary

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata() -> Command {
    cargo_bin_cmd!("strata")
}

fn write(dir: &Path, name: &str, text: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

#[test]
fn test_render_with_json_data() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "hello.html.tpl", "Hello, $${ name }!");
    write(dir.path(), "data.json", r#"{"name": "<Ada>"}"#);

    strata()
        .arg("render")
        .arg("hello")
        .arg("--root")
        .arg(dir.path())
        .arg("--data")
        .arg(dir.path().join("data.json"))
        .assert()
        .success()
        .stdout("Hello, &lt;Ada&gt;!");
}

#[test]
fn test_render_with_yaml_data_and_format() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "list.txt.tpl",
        "%{ for item in items }- ${ item }\n%{ end }",
    );
    write(dir.path(), "data.yaml", "items:\n  - one\n  - two\n");

    strata()
        .args(["render", "list", "--format", "txt", "--root"])
        .arg(dir.path())
        .arg("--data")
        .arg(dir.path().join("data.yaml"))
        .assert()
        .success()
        .stdout("- one\n- two\n");
}

#[test]
fn test_render_string_second_pass() {
    strata()
        .args(["render-string", "{% x = 6 * 7 %}{{{ x }}}", "--syntax", "second-pass"])
        .assert()
        .success()
        .stdout("42");
}

#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.html.tpl", "[${ ghost }]");
    let config = dir.path().join("strata.toml");
    fs::write(
        &config,
        format!(
            "roots = [{:?}]\nstrict_variables = true\n",
            dir.path().to_string_lossy()
        ),
    )
    .unwrap();

    strata()
        .args(["render", "page", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined variable 'ghost'"));
}

#[test]
fn test_convert() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.html.tpl", "${ a }%{ if b -}\nx%{ end }");

    strata()
        .arg("convert")
        .arg(dir.path().join("page.html.tpl"))
        .args(["--to", "second-pass"])
        .assert()
        .success()
        .stdout("{{{ a }}}{% if b -%}\nx{% end %}");
}

#[test]
fn test_convert_refuses_to_change_meaning() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "style.html.tpl", ".a{${ rule }}");

    strata()
        .arg("convert")
        .arg(dir.path().join("style.html.tpl"))
        .args(["--to", "second-pass"])
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("cannot convert without changing the template"));
}

#[test]
fn test_tokens() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "t.html.tpl", "a${ b }");

    strata()
        .arg("tokens")
        .arg(dir.path().join("t.html.tpl"))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "expression""#))
        .stdout(predicate::str::contains(r#""body": " b ""#));
}

#[test]
fn test_compile() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "base.html.tpl", "<%{ block x }base%{ endblock }>");
    write(
        dir.path(),
        "child.html.tpl",
        "%{ extends \"base\" }%{ block x }child%{ endblock }",
    );

    strata()
        .args(["compile", "child", "--root"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""op": "emit_literal""#))
        .stdout(predicate::str::contains(r#""text": "child""#))
        .stdout(predicate::str::contains("base.html.tpl").count(2));
}

#[test]
fn test_unknown_template_fails() {
    let dir = TempDir::new().unwrap();
    strata()
        .args(["render", "nothing", "--root"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("'nothing'"));
}

#[test]
fn test_requires_subcommand() {
    strata().assert().failure();
}

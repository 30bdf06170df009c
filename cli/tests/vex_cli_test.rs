use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn sources_script_and_echoes() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script_path = dir.path().join("hello.vim");
    fs::write(
        &script_path,
        r#"
let greeting = 'hello'
function! Shout(s)
  return toupper(a:s) . '!'
endfunction
echo Shout(greeting)
for n in range(3)
  echon n
endfor
"#,
    )?;

    let mut cmd = Command::cargo_bin("vex")?;
    cmd.arg(&script_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("HELLO!"))
        .stdout(predicate::str::contains("012"));

    Ok(())
}

#[test]
fn reports_script_error_with_failure_status() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script_path = dir.path().join("bad.vim");
    fs::write(&script_path, "echo 'before'\necho no_such_var\n")?;

    let mut cmd = Command::cargo_bin("vex")?;
    cmd.arg(&script_path);
    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("before"))
        .stderr(predicate::str::contains("Undefined variable: no_such_var"));

    Ok(())
}

#[test]
fn eval_prints_result() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("vex")?;
    cmd.args(["eval", "1 + 2"]);
    cmd.assert().success().stdout(predicate::str::diff("3\n"));

    let mut cmd = Command::cargo_bin("vex")?;
    cmd.args(["eval", "map([1, 2], 'v:val * 10')"]);
    cmd.assert().success().stdout(predicate::str::contains("[10, 20]"));

    Ok(())
}

#[test]
fn eval_reports_error() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("vex")?;
    cmd.args(["eval", "1 +"]);
    cmd.assert().failure().stderr(predicate::str::starts_with("Error: "));
    Ok(())
}

#[test]
fn config_limits_function_depth() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config_path = dir.path().join("vex.toml");
    fs::write(&config_path, "max_func_depth = 5\n")?;
    let script_path = dir.path().join("deep.vim");
    fs::write(
        &script_path,
        r#"
function! Down(n)
  return a:n <= 0 ? 0 : Down(a:n - 1)
endfunction
echo Down(3)
echo Down(20)
"#,
    )?;

    let mut cmd = Command::cargo_bin("vex")?;
    cmd.arg("--config").arg(&config_path).arg(&script_path);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("0"))
        .stderr(predicate::str::contains("maxfuncdepth"));

    Ok(())
}

#[test]
fn rejects_parent_dir_paths() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("vex")?;
    cmd.arg("../script.vim");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));
    Ok(())
}

#[test]
fn loads_autoload_functions() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let autoload = dir.path().join("autoload");
    fs::create_dir_all(&autoload)?;
    fs::write(
        autoload.join("greet.vim"),
        "function! greet#Hello(name)\n  return 'hi ' . a:name\nendfunction\n",
    )?;
    let script_path = dir.path().join("main.vim");
    fs::write(&script_path, "echo greet#Hello('bob')\n")?;

    let mut cmd = Command::cargo_bin("vex")?;
    cmd.arg("--autoload-dir").arg(&autoload).arg(&script_path);
    cmd.assert().success().stdout(predicate::str::contains("hi bob"));
    Ok(())
}

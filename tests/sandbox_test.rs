//! Runs against a real interpreter; each test returns early when none is installed.

use std::time::Duration;

use pretty_assertions::assert_eq;
use pylive::{
    annotate::Annotation,
    config::EvalSettings,
    driver::{CycleOutcome, Driver},
    execution::{python::PythonSandbox, ErrorClass, Executor},
    process::{default_python, python::probe, Interpreter},
};

fn python() -> Option<Interpreter> {
    let path = std::env::var("PYLIVE_TEST_PYTHON").unwrap_or_else(|_| default_python().to_string());
    let ok = std::process::Command::new(&path)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !ok {
        eprintln!("skipping: no python interpreter at '{}'", path);
        return None;
    }
    Some(Interpreter::new(path))
}

fn sandbox(interpreter: Interpreter) -> PythonSandbox {
    PythonSandbox::new(interpreter, Duration::from_secs(10))
}

async fn annotations(interpreter: Interpreter, text: &str) -> Vec<Annotation> {
    let driver = Driver::new(sandbox(interpreter));
    match driver.evaluate(text, &EvalSettings::default()).await {
        CycleOutcome::Completed(a) => a,
        CycleOutcome::Skipped => panic!("cycle was skipped"),
    }
}

#[tokio::test]
async fn test_trailing_expression_is_annotated() {
    let Some(py) = python() else { return };
    let got = annotations(py, "x = 1\ny = 2\nx + y  # ?").await;
    assert_eq!(got, vec![Annotation::value(2, " → 3")]);
}

#[tokio::test]
async fn test_print_is_annotated_with_its_output() {
    let Some(py) = python() else { return };
    let got = annotations(py, "print(\"hi\")  # ?").await;
    assert_eq!(got, vec![Annotation::value(0, " ▶ hi")]);
}

#[tokio::test]
async fn test_name_error_does_not_poison_later_units() {
    let Some(py) = python() else { return };
    let got = annotations(py, "y = undefined_thing  # ?\nz = 5  # ?").await;
    assert_eq!(
        got,
        vec![
            Annotation::error(0, "Name Error: name 'undefined_thing' is not defined"),
            Annotation::value(1, " // z: 5"),
        ]
    );
}

#[tokio::test]
async fn test_snapshot_renders_values_and_callables() {
    let Some(py) = python() else { return };
    let program = "import math\ndef f():\n    return 1\nclass K:\n    pass\nname = 'py'\nitems = list(range(100))";
    let result = sandbox(py).run(program, "items = list(range(100))", 6).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.variables.get("f"), Some("<function f>"));
    assert_eq!(result.variables.get("K"), Some("<function K>"));
    assert_eq!(result.variables.get("name"), Some("'py'"));
    assert!(result.variables.get("math").is_some());
    let items = result.variables.get("items").unwrap();
    assert_eq!(items.chars().count(), 100);
    assert!(items.ends_with("..."));
    assert_eq!(result.variables.last(1)[0].0, "items");
    assert!(result.variables.get("print").is_none());
    assert!(result.variables.get("__builtins__").is_none());
}

#[tokio::test]
async fn test_user_bindings_named_like_modules_are_kept() {
    let Some(py) = python() else { return };
    let result = sandbox(py).run("re = 5\nk = 1\nresult = 2", "result = 2", 2).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.variables.get("re"), Some("5"));
    assert_eq!(result.variables.get("k"), Some("1"));
    assert_eq!(result.variables.get("result"), Some("2"));
}

#[tokio::test]
async fn test_long_output_is_elided() {
    let Some(py) = python() else { return };
    let result = sandbox(py).run("for i in range(15):\n    print(i)", "for i in range(15):\n    print(i)", 1).await;
    assert!(result.success);
    let output = result.output.unwrap();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[9], "9");
    assert_eq!(lines[10], "... (5 more lines)");
    assert_eq!(result.print_outputs.len(), 15);
}

#[tokio::test]
async fn test_syntax_and_indentation_errors_are_classified() {
    let Some(py) = python() else { return };
    let sb = sandbox(py);

    let result = sb.run("x = = 1", "x = = 1", 0).await;
    assert_eq!(result.error_class(), Some(ErrorClass::Syntax));

    let result = sb.run("if True:\nprint(1)", "if True:\nprint(1)", 1).await;
    assert_eq!(result.error_class(), Some(ErrorClass::Indentation));

    let result = sb.run("1 / 0", "1 / 0", 0).await;
    assert_eq!(result.error_class(), Some(ErrorClass::Other("ZeroDivisionError".into())));
    assert_eq!(result.error.as_deref(), Some("ZeroDivisionError: division by zero"));
}

#[tokio::test]
async fn test_expression_side_effects_are_not_logged_twice() {
    let Some(py) = python() else { return };
    let code = "def loud():\n    print('side')\n    return 7";
    let program = format!("{}\nloud()", code);
    let result = sandbox(py).run(&program, "loud()", 3).await;
    assert!(result.success);
    assert_eq!(result.expression.as_deref(), Some("7"));
    assert_eq!(result.print_outputs.len(), 1);
    assert_eq!(result.output.as_deref(), Some("side"));
}

#[tokio::test]
async fn test_runaway_unit_times_out() {
    let Some(py) = python() else { return };
    let sb = PythonSandbox::new(py, Duration::from_secs(1));
    let result = sb.run("while True:\n    pass", "while True:\n    pass", 1).await;
    assert!(!result.success);
    assert_eq!(result.error_class(), Some(ErrorClass::Timeout));
    assert_eq!(result.error.as_deref(), Some("Evaluation timeout (1s)"));
}

#[tokio::test]
async fn test_missing_interpreter_is_a_launch_error() {
    let sb = PythonSandbox::new(Interpreter::new("/nonexistent/bin/python3"), Duration::from_secs(1));
    let result = sb.run("x = 1", "x = 1", 0).await;
    assert!(!result.success);
    assert_eq!(result.error_class(), Some(ErrorClass::Launch));
    assert!(result.error.unwrap().starts_with("Python process error"));
}

#[tokio::test]
async fn test_probe_reports_version() {
    let Some(py) = python() else { return };
    let info = probe(&py).await.unwrap();
    assert_ne!(info.version, "Unknown");
    assert!(!info.status_line().is_empty());
}

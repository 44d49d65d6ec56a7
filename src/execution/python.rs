//! Python execution protocol: one fresh interpreter per unit, JSON result on the last line.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};

use super::{trailing_expression_candidate, ExecutionResult, Executor, SandboxError};
use crate::{
    process::{python::start_python, Interpreter},
    utils::unicode::char_to_byte_index,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Bootstrap run by the interpreter. Reads `{program, expression}` from stdin and
/// writes the result as the final stdout line.
const HARNESS: &str = r#"
import io
import json
import os
import sys

_payload = json.loads(sys.stdin.read())
sys.stdin = io.StringIO("")

_real_stdout = sys.stdout
_capture = io.StringIO()
_result = {
    'success': False,
    'variables': {},
    'expression': None,
    'output': None,
    'error': None,
    'print_outputs': [],
}
_hidden = {'sys', 'io', 'json', 'print'}
_state = {'count': 0, 'quiet': False}
_builtin_print = print


class _Tee(io.TextIOBase):
    def __init__(self, *streams):
        self._streams = streams

    def writable(self):
        return True

    def write(self, text):
        for stream in self._streams:
            stream.write(text)
        return len(text)

    def flush(self):
        for stream in self._streams:
            stream.flush()


def _logging_print(*args, **kwargs):
    target = kwargs.get('file')
    if target is not None and target is not sys.stdout:
        return _builtin_print(*args, **kwargs)
    kwargs.pop('file', None)
    if not _state['quiet']:
        buf = io.StringIO()
        _builtin_print(*args, file=buf, **kwargs)
        _result['print_outputs'].append({'index': _state['count'], 'text': buf.getvalue().rstrip()})
        _state['count'] += 1
    _builtin_print(*args, **kwargs)


def _clip(text, limit):
    if len(text) > limit:
        return text[:limit - 3] + '...'
    return text


def _render(value):
    try:
        if callable(value):
            if hasattr(value, '__name__'):
                return '<function %s>' % value.__name__
            if hasattr(value, '__class__'):
                return '<%s object>' % value.__class__.__name__
            return '<callable>'
        return _clip(repr(value), 100)
    except Exception:
        return '<%s>' % type(value).__name__


def _classify(exc):
    if isinstance(exc, IndentationError):
        return 'Indentation Error: ' + str(exc).split(' (', 1)[0]
    if isinstance(exc, SyntaxError):
        return 'Syntax Error: ' + str(exc).split(' (', 1)[0]
    if isinstance(exc, NameError):
        return 'Name Error: ' + str(exc)
    if isinstance(exc, RuntimeError):
        return 'Runtime Error: ' + str(exc)
    return '%s: %s' % (type(exc).__name__, _clip(str(exc), 100))


_ns = {'__name__': '__main__', '__builtins__': __builtins__, 'print': _logging_print}
sys.stdout = _Tee(_capture, _real_stdout)
try:
    exec(_payload['program'], _ns)
    _vars = {}
    for _name, _value in list(_ns.items()):
        if _name.startswith('_') or _name in _hidden:
            continue
        _vars[_name] = _render(_value)
    _result['variables'] = _vars
    _result['success'] = True
except BaseException as _exc:
    _result['error'] = _classify(_exc)
finally:
    sys.stdout = _real_stdout

_text = _capture.getvalue().strip()
if _text:
    _lines = _text.split('\n')
    if len(_lines) > 10:
        _text = '\n'.join(_lines[:10]) + '\n... (%d more lines)' % (len(_lines) - 10)
    _result['output'] = _text

_line = _payload.get('expression')
if _result['success'] and _line:
    _state['quiet'] = True
    sys.stdout = io.StringIO()
    try:
        _value = eval(_line, _ns)
        if _value is not None:
            _result['expression'] = _clip(repr(_value), 200)
    except BaseException:
        pass
    finally:
        sys.stdout = _real_stdout
        _state['quiet'] = False

try:
    _real_stdout.flush()
except Exception:
    pass
os.write(1, ('\n' + json.dumps(_result) + '\n').encode('utf-8'))
os._exit(0)
"#;

#[derive(Serialize)]
struct Payload<'a> {
    program: &'a str,
    expression: Option<&'a str>,
}

/// Runs each program in a new interpreter process, killed after `timeout`.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: Interpreter,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(interpreter: Interpreter, timeout: Duration) -> Self {
        Self { interpreter, timeout }
    }

    async fn execute(&self, program: &str, unit_code: &str) -> Result<ExecutionResult, SandboxError> {
        let payload = serde_json::to_vec(&Payload {
            program,
            expression: trailing_expression_candidate(unit_code),
        })
        .map_err(|e| SandboxError::Protocol(format!("Failed to encode program: {}", e)))?;

        let mut child = start_python(&self.interpreter, HARNESS).map_err(SandboxError::Launch)?;
        let mut stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let exchange = async {
            let write = async {
                if let Some(mut pipe) = stdin.take() {
                    // The interpreter may die before reading; its stderr says why.
                    if let Err(e) = pipe.write_all(&payload).await {
                        debug!("payload write failed: {}", e);
                    }
                    drop(pipe);
                }
                Ok::<_, std::io::Error>(())
            };
            let read_out = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stdout.as_mut() {
                    pipe.read_to_end(&mut buf).await?;
                }
                Ok::<_, std::io::Error>(buf)
            };
            let read_err = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stderr.as_mut() {
                    pipe.read_to_end(&mut buf).await?;
                }
                Ok::<_, std::io::Error>(buf)
            };
            tokio::try_join!(write, read_out, read_err, child.wait())
        };

        let outcome = timeout(self.timeout, exchange).await;
        let (_, out, err, status) = match outcome {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => return Err(SandboxError::Io(e)),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "evaluation timed out, killing interpreter");
                if let Err(e) = child.kill().await {
                    warn!("failed to kill interpreter: {}", e);
                }
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        debug!(status = ?status.code(), stdout_bytes = out.len(), stderr_bytes = err.len(), "interpreter exited");
        parse_process_output(&String::from_utf8_lossy(&out), &String::from_utf8_lossy(&err))
    }
}

#[async_trait]
impl Executor for PythonSandbox {
    async fn run(&self, program: &str, unit_code: &str, end_line: usize) -> ExecutionResult {
        debug!(end_line, program_bytes = program.len(), "running unit");
        match self.execute(program, unit_code).await {
            Ok(result) => result,
            Err(e) => e.into(),
        }
    }
}

/// Decode the result line, falling back to whatever diagnostics the process left.
pub fn parse_process_output(stdout: &str, stderr: &str) -> Result<ExecutionResult, SandboxError> {
    let last = stdout.lines().rev().find(|l| !l.trim().is_empty());
    if let Some(line) = last {
        match serde_json::from_str::<ExecutionResult>(line.trim()) {
            Ok(result) => return Ok(result),
            Err(e) => warn!("unparseable result line: {}", e),
        }
    }

    if !stderr.trim().is_empty() {
        let first = stderr
            .lines()
            .find(|l| l.contains("Error"))
            .or_else(|| stderr.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or_default();
        return Err(SandboxError::Protocol(first.trim().to_string()));
    }
    if !stdout.trim().is_empty() {
        return Err(SandboxError::Protocol(format!("Invalid output: {}", clip_raw(stdout, 100))));
    }
    Err(SandboxError::Protocol("No output from evaluation".to_string()))
}

fn clip_raw(s: &str, limit: usize) -> &str {
    let end = char_to_byte_index(s, limit);
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ErrorClass;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_result_is_taken_from_last_line() {
        let stdout = "hi\nprinted {not json}\n\n{\"success\": true, \"variables\": {\"x\": \"1\"}, \"print_outputs\": []}\n";
        let result = parse_process_output(stdout, "").unwrap();
        assert!(result.success);
        assert_eq!(result.variables.get("x"), Some("1"));
    }

    #[test]
    fn test_stderr_error_line_is_reported() {
        let err = parse_process_output(
            "",
            "Traceback (most recent call last):\n  File \"<string>\", line 3\nMemoryError: out of memory\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "MemoryError: out of memory");
        let result: ExecutionResult = err.into();
        assert_eq!(result.error_class(), Some(ErrorClass::Protocol));
    }

    #[test]
    fn test_stderr_without_error_token_uses_first_line() {
        let err = parse_process_output("", "\nKilled\nsomething else\n").unwrap_err();
        assert_eq!(err.to_string(), "Killed");
    }

    #[test]
    fn test_invalid_stdout_is_truncated() {
        let noise = "z".repeat(150);
        let err = parse_process_output(&noise, "").unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid output: {}", "z".repeat(100)));
    }

    #[test]
    fn test_no_output() {
        let err = parse_process_output("", "  \n").unwrap_err();
        assert_eq!(err.to_string(), "No output from evaluation");
    }

    #[test]
    fn test_payload_carries_expression_candidate() {
        let json = serde_json::to_string(&Payload {
            program: "x = 1\nx",
            expression: trailing_expression_candidate("x"),
        })
        .unwrap();
        assert_eq!(json, r#"{"program":"x = 1\nx","expression":"x"}"#);
    }
}

//! The two interpreter drivers embedded in the agent binary. Each reads one
//! JSON request per line from stdin, evaluates `code` in a namespace that
//! persists across lines, and writes one JSON response per line to stdout.

pub const PYTHON_REPL_SCRIPT: &str = r#"
import contextlib
import io
import json
import sys
import traceback

globals_ns = {"__name__": "__main__"}

for line in sys.stdin:
    line = line.rstrip("\n")
    if not line:
        continue
    try:
        req = json.loads(line)
    except Exception:
        continue
    code = req.get("code", "")
    out = io.StringIO()
    err = io.StringIO()
    failure = ""
    try:
        with contextlib.redirect_stdout(out), contextlib.redirect_stderr(err):
            exec(code, globals_ns)
    except Exception:
        failure = traceback.format_exc()
    resp = {"stdout": out.getvalue(), "stderr": err.getvalue(), "error": failure}
    sys.stdout.write(json.dumps(resp) + "\n")
    sys.stdout.flush()
"#;

pub const NODE_REPL_SCRIPT: &str = r#"
const readline = require("readline");
const vm = require("vm");

const context = vm.createContext({
  console,
  require,
  process,
  Buffer,
  setTimeout,
  setInterval,
  clearTimeout,
  clearInterval,
});

const rl = readline.createInterface({
  input: process.stdin,
  crlfDelay: Infinity,
});

rl.on("line", (line) => {
  if (!line) {
    return;
  }
  let req;
  try {
    req = JSON.parse(line);
  } catch (err) {
    return;
  }
  let stdout = "";
  let stderr = "";
  let error = "";

  const originalStdoutWrite = process.stdout.write.bind(process.stdout);
  const originalStderrWrite = process.stderr.write.bind(process.stderr);
  const originalConsoleLog = console.log;
  const originalConsoleError = console.error;

  process.stdout.write = (chunk, encoding, cb) => {
    stdout += chunk instanceof Buffer ? chunk.toString() : chunk;
    if (typeof cb === "function") {
      cb();
    }
    return true;
  };
  process.stderr.write = (chunk, encoding, cb) => {
    stderr += chunk instanceof Buffer ? chunk.toString() : chunk;
    if (typeof cb === "function") {
      cb();
    }
    return true;
  };
  console.log = (...args) => {
    stdout += args.join(" ") + "\n";
  };
  console.error = (...args) => {
    stderr += args.join(" ") + "\n";
  };

  try {
    vm.runInContext(req.code || "", context);
  } catch (err) {
    error = err && err.stack ? err.stack : String(err);
  }

  process.stdout.write = originalStdoutWrite;
  process.stderr.write = originalStderrWrite;
  console.log = originalConsoleLog;
  console.error = originalConsoleError;

  const resp = JSON.stringify({ stdout, stderr, error });
  originalStdoutWrite(resp + "\n");
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_non_empty() {
        assert!(PYTHON_REPL_SCRIPT.contains("json.dumps"));
        assert!(NODE_REPL_SCRIPT.contains("JSON.stringify"));
    }
}

//! Shell scripts standing in for the batch runner.
//!
//! All scripts run with the proof root as working directory and register a
//! run the way the real runner does: a new directory under the runs dir
//! containing `run.json`.

use crate::fixtures::RUNS_DIR;

fn register(run: &str) -> String {
    format!(
        "mkdir -p {RUNS_DIR}/{run}/html\n\
         printf '{{\"start_time\": \"%s\"}}' \"$(date -u +%Y-%m-%dT%H:%M:%SZ)\" > {RUNS_DIR}/{run}/run.json\n\
         echo '<html>{run}</html>' > {RUNS_DIR}/{run}/html/index.html\n"
    )
}

/// Register `run`, print `lines` with a short pause between them, then stay
/// alive for `linger_secs`.
pub fn registering_runner(run: &str, lines: &[&str], linger_secs: u32) -> String {
    let mut script = String::from("set -e\n");
    script.push_str(&register(run));
    for line in lines {
        script.push_str(&format!("echo '{line}'\nsleep 0.05\n"));
    }
    if linger_secs > 0 {
        script.push_str(&format!("sleep {linger_secs}\n"));
    }
    script
}

/// Register `run`, then exit with `code` after writing to both streams.
pub fn failing_runner(run: &str, code: i32) -> String {
    format!(
        "{}echo 'checking proofs'\necho 'cbmc crashed' >&2\nexit {code}\n",
        register(run)
    )
}

/// Exit immediately without registering anything.
pub fn crashing_runner(code: i32) -> String {
    format!("echo 'cannot start' >&2\nexit {code}\n")
}

/// Print a line but never register a run.
pub fn silent_runner(linger_secs: u32) -> String {
    format!("echo 'warming up'\nsleep {linger_secs}\n")
}

/// Register `run`, start a long-lived worker in its own session (so it is not
/// in the runner's process group), record its pid in `worker.pid` and wait.
pub fn forking_runner(run: &str) -> String {
    format!(
        "{}echo 'spawning worker'\n\
         (setsid sleep 300 || sleep 300) &\n\
         echo $! > worker.pid\n\
         sleep 300\n",
        register(run)
    )
}

use std::{
    error::Error,
    io,
    path::Path,
    process::{Command, Output},
    str,
};

const MILLIE_PATH: &str = "./target/debug/millie";

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl<'a> Expected<'a> {
    fn assert_matches(self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?.trim_end(), self.stdout);
        if !self.stderr.is_empty() {
            assert!(str::from_utf8(&output.stderr)?.contains(self.stderr));
        }
        Ok(())
    }
}

fn run_millie(src_path: &Path, extra_args: &[&str]) -> Result<Output, io::Error> {
    Command::new(MILLIE_PATH).args(extra_args).arg(src_path).output()
}

/// Runs `src_path` and asserts its stdout/stderr match `expected`.
pub fn check_run(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let output = run_millie(src_path, &[])?;
    expected.assert_matches(&output)?;
    assert!(
        output.status.success(),
        "millie exited with status {:?}",
        output.status.code()
    );
    Ok(())
}

/// Runs `millie --print-type` on `src_path` and asserts the printed type.
pub fn check_type(src_path: &Path, expected_type: &str) -> Result<(), Box<dyn Error>> {
    let output = run_millie(src_path, &["--print-type"])?;
    assert_eq!(str::from_utf8(&output.stdout)?.trim_end(), expected_type);
    assert!(
        output.status.success(),
        "millie exited with status {:?}",
        output.status.code()
    );
    Ok(())
}

/// Runs `src_path` and asserts it fails with diagnosed errors (exit code 1).
pub fn check_diagnosed_failure(src_path: &Path) -> Result<(), Box<dyn Error>> {
    let output = run_millie(src_path, &[])?;
    assert_eq!(
        output.status.code(),
        Some(1),
        "expected exit code 1, got {:?}; stderr: {}",
        output.status.code(),
        str::from_utf8(&output.stderr)?
    );
    Ok(())
}

/// Runs `millie --help` and asserts it exits 0.
pub fn check_help_exits_successfully() -> Result<(), Box<dyn Error>> {
    let output = Command::new(MILLIE_PATH).arg("--help").output()?;
    assert_eq!(
        output.status.code(),
        Some(0),
        "expected exit code 0, got {:?}",
        output.status.code()
    );
    Ok(())
}

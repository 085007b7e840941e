//! FileCheck-style checks for text IR files.
//!
//! A test file carries its program, one `; RUN:` line naming the compile
//! options, and `; CHECK` directives matched in order against the output.
//! `; RUN: not vec4c ...` expects the compilation to fail, in which case the
//! error message is the output.

use super::{parse_program, print_instructions, print_program};
use crate::compiler::{CompileOptions, Vec4Compiler};
use crate::core::{CompileError, DeviceInfo};
use crate::ir::Program;

/// A CHECK directive extracted from a test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// `CHECK:` match a later line.
    Check(String),
    /// `CHECK-NEXT:` match the line right after the previous match.
    CheckNext(String),
    /// `CHECK-NOT:` no line up to the next match may contain the pattern.
    CheckNot(String),
    /// `CHECK-EMPTY` the next line is empty.
    CheckEmpty,
    /// `COM:` ignored.
    Comment(String),
}

/// Options of one compilation, shared by test files and the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub devinfo: DeviceInfo,
    pub compile: CompileOptions,
    /// Stop after the optimization loop and print the virtual program.
    pub dump_opt: bool,
    /// The compilation is expected to fail.
    pub expect_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            devinfo: DeviceInfo::default(),
            compile: CompileOptions::default(),
            dump_opt: false,
            expect_failure: false,
        }
    }
}

impl RunOptions {
    /// Parse the arguments of a `RUN:` line.
    pub fn from_run_line(line: &str) -> Result<Self, String> {
        let mut options = RunOptions::default();
        let mut words = line.split_whitespace().peekable();
        if words.peek() == Some(&"not") {
            options.expect_failure = true;
            words.next();
        }
        if words.next() != Some("vec4c") {
            return Err(format!("RUN line does not invoke vec4c: {line}"));
        }
        let mut grf_count = None;
        while let Some(word) = words.next() {
            let mut value = |name: &str| -> Result<u32, String> {
                words
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| format!("{name} needs a number"))
            };
            match word {
                "--gen" => {
                    let gen = value("--gen")?;
                    options.devinfo = DeviceInfo::for_generation(gen).ok_or_else(|| format!("no gen{gen} preset"))?;
                }
                "--grf-count" => grf_count = Some(value("--grf-count")?),
                "--no-opt" => options.compile.optimize = false,
                "--no-split" => options.compile.split_registers = false,
                "--dump-opt" => options.dump_opt = true,
                "%s" => {}
                other => return Err(format!("unknown option {other}")),
            }
        }
        if let Some(count) = grf_count {
            options.devinfo = options.devinfo.with_grf_count(count);
        }
        Ok(options)
    }
}

/// Compile `program` and render the result as text: the optimized virtual
/// program with `dump_opt`, otherwise the allocated program followed by a
/// summary comment.
pub fn render(options: &RunOptions, program: Program) -> Result<String, CompileError> {
    let mut compiler = Vec4Compiler::with_options(options.devinfo.clone(), options.compile.clone());
    if options.dump_opt {
        let shader = compiler.optimize(program)?;
        return Ok(print_program(&shader.to_program()));
    }
    let compiled = compiler.compile(program)?;
    let mut out = print_instructions(&compiled.instructions);
    out.push_str(&format!(
        "; {}: {} registers, {} spills, {} scratch bytes, {} pull constant bytes\n",
        options.devinfo.name,
        compiled.grf_used,
        compiled.stats.spill_iterations,
        compiled.scratch_bytes,
        compiled.pull_constant_bytes
    ));
    Ok(out)
}

/// Test description extracted from a text IR file.
#[derive(Debug)]
pub struct TestSpec {
    pub run: RunOptions,
    pub check_directives: Vec<CheckDirective>,
    pub source: String,
}

impl TestSpec {
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run = None;
        let mut check_directives = Vec::new();
        let mut source = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            let directive = |prefix: &str| trimmed.strip_prefix(prefix).map(|p| p.trim().to_string());
            if let Some(cmd) = directive("; RUN:") {
                if run.is_some() {
                    return Err("more than one RUN line".to_string());
                }
                run = Some(RunOptions::from_run_line(&cmd)?);
            } else if let Some(p) = directive("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(p));
            } else if let Some(p) = directive("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(p));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(p) = directive("; CHECK:") {
                check_directives.push(CheckDirective::Check(p));
            } else if let Some(p) = directive("; COM:") {
                check_directives.push(CheckDirective::Comment(p));
            } else {
                source.push(line);
            }
        }

        Ok(TestSpec {
            run: run.ok_or("missing RUN line")?,
            check_directives,
            source: source.join("\n"),
        })
    }
}

/// Runs parsed test files.
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Compile the test program and match the output.
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        let program = parse_program(&spec.source).map_err(|e| e.to_string())?;
        let output = match (render(&spec.run, program), spec.run.expect_failure) {
            (Ok(out), false) => out,
            (Err(e), true) => e.to_string(),
            (Ok(out), true) => return Err(format!("expected the compilation to fail, got:\n{out}")),
            (Err(e), false) => return Err(format!("compilation failed: {e}")),
        };
        if self.verbose {
            log::info!("output:\n{output}");
        }
        self.validate_output(&output, &spec.check_directives)
            .map_err(|e| format!("{e}\noutput:\n{output}"))
    }

    /// Validate output against CHECK directives.
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        // Lines in `range` must not contain any pending CHECK-NOT pattern.
        let check_nots = |pending: &mut Vec<&str>, range: std::ops::Range<usize>| -> Result<(), String> {
            for pattern in pending.drain(..) {
                if let Some(line) = lines[range.clone()].iter().find(|l| l.contains(pattern)) {
                    return Err(format!("CHECK-NOT: '{pattern}' found in '{line}'"));
                }
            }
            Ok(())
        };

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => {}
                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),
                CheckDirective::Check(pattern) => {
                    let idx = lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()))
                        .map(|i| i + line_idx)
                        .ok_or_else(|| format!("CHECK: pattern '{pattern}' not found in output"))?;
                    check_nots(&mut pending_not, line_idx..idx)?;
                    if self.verbose {
                        log::debug!("CHECK: '{pattern}' found at line {idx}");
                    }
                    line_idx = idx + 1;
                }
                CheckDirective::CheckNext(pattern) => {
                    let line = lines
                        .get(line_idx)
                        .ok_or_else(|| format!("CHECK-NEXT: no more lines, expected '{pattern}'"))?;
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{pattern}' but got '{line}'"));
                    }
                    check_nots(&mut pending_not, line_idx..line_idx)?;
                    line_idx += 1;
                }
                CheckDirective::CheckEmpty => {
                    if let Some(line) = lines.get(line_idx) {
                        if !line.trim().is_empty() {
                            return Err(format!("CHECK-EMPTY: expected empty line but got '{line}'"));
                        }
                        line_idx += 1;
                    }
                }
            }
        }
        check_nots(&mut pending_not, line_idx..lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directives() {
        let content = "; RUN: vec4c --gen 6 --grf-count 16 --no-opt %s
; CHECK: mul
; CHECK-NEXT: urb_write
; CHECK-NOT: vgrf
; COM: attributes start after the header
mul vgrf0:f, attr0:f, attr0:f";

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run.devinfo.name, "gen6");
        assert_eq!(spec.run.devinfo.grf_count, 16);
        assert!(!spec.run.compile.optimize);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.source.contains("mul vgrf0"));

        assert!(TestSpec::parse("mov vgrf0:f, attr0:f").is_err());
        assert!(RunOptions::from_run_line("vec4c --gen 5").is_err());
        assert!(RunOptions::from_run_line("not vec4c --gen 8").unwrap().expect_failure);
    }

    #[test]
    fn matches_in_order() {
        let runner = TestRunner::new(false);
        let output = "mul g2:f, g1:f, g1:f\nmov g3:f, g2:f\nurb_write null:ud, m0:ud mlen=2\n";

        let directives = vec![
            CheckDirective::Check("mul".to_string()),
            CheckDirective::CheckNot("vgrf".to_string()),
            CheckDirective::CheckNext("mov".to_string()),
            CheckDirective::Check("urb_write".to_string()),
        ];
        runner.validate_output(output, &directives).unwrap();

        let wrong_next = vec![
            CheckDirective::Check("mul".to_string()),
            CheckDirective::CheckNext("urb_write".to_string()),
        ];
        let err = runner.validate_output(output, &wrong_next).unwrap_err();
        assert!(err.contains("CHECK-NEXT"), "{err}");

        let forbidden = vec![
            CheckDirective::Check("mul".to_string()),
            CheckDirective::CheckNot("mov".to_string()),
            CheckDirective::Check("urb_write".to_string()),
        ];
        assert!(runner.validate_output(output, &forbidden).is_err());
    }
}

//! Code specification: the tagged representation of a runner and its hooks.
//!
//! A code fragment is never evaluated by embedding a hosted language runtime.
//! Instead every fragment resolves, by name, against the closed
//! [`registry`](crate::registry) of built-in workloads.
use std::{any::Any, path::PathBuf, sync::Arc};

use async_trait::async_trait;

use crate::{error::Error, registry};

/// Suite-wide state produced by [`Runner::init`] and shared (read-only) with every
/// worker's [`Runner::init_runner`] and with [`Runner::done`].
pub type SuiteState = Box<dyn Any + Send + Sync>;

/// Per-worker state produced by [`Runner::init_runner`] and owned exclusively by the
/// worker that created it.
pub type WorkerState = Box<dyn Any + Send>;

/// The `init` / `init_runner` / `runner` / `done` lifecycle a code fragment implements.
///
/// All four methods have permissive defaults so a workload can override only the
/// hooks it needs; `runner` is the only one a workload must implement.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs once before any worker starts. Produces the suite state `S`.
    async fn init(&self) -> anyhow::Result<SuiteState> {
        Ok(Box::new(()))
    }

    /// Runs once per worker before its loop begins. Produces the worker state `W`.
    #[allow(unused_variables)]
    async fn init_runner(&self, worker_id: u32, suite: &SuiteState) -> anyhow::Result<WorkerState> {
        Ok(Box::new(()))
    }

    /// Runs repeatedly in a tight loop per worker. The unit of work counted.
    #[allow(unused_variables)]
    async fn run(&self, worker_id: u32, state: &mut WorkerState) -> anyhow::Result<()>;

    /// Runs once after the last worker stops.
    #[allow(unused_variables)]
    async fn done(&self, suite: &SuiteState) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Executes a resolved runner's entire one-shot lifecycle (`init` → `init_runner` →
/// `run` once → `done`) and discards the produced state.
///
/// This is how an attached hook (`--init N CODE`, `--done N CODE`) is executed: a hook
/// is itself a fully resolved [`Runner`], but in its hook slot it is invoked exactly
/// once rather than looped.
pub(crate) async fn execute_once(runner: &dyn Runner) -> anyhow::Result<()> {
    let suite = runner.init().await?;
    let mut worker = runner.init_runner(0, &suite).await?;
    runner.run(0, &mut worker).await?;
    runner.done(&suite).await?;
    Ok(())
}

/// A literal argument to a registry lookup.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// A signed integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A string literal (unquoted in `module:function(args).` expressions).
    Str(String),
}

impl Arg {
    /// Returns the argument as an `i64`, if it holds one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the argument as a string slice, if it holds one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Float(n) => write!(f, "{n}"),
            Arg::Str(s) => write!(f, "{s}"),
        }
    }
}

/// The three shapes a positional code argument may take.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CodeSpec {
    /// `module:function(args).` — sugar over a structured lookup.
    Expression(String),
    /// `{module, function, [args]}` — a structured triple.
    Structured { module: String, function: String, args: Vec<Arg> },
    /// A path to a file containing a serialized pre-recorded call trace.
    Trace(PathBuf),
}

/// A deserialization shape for the structured `{module, function, args}` triple.
#[derive(serde::Deserialize)]
struct StructuredTriple {
    module: String,
    function: String,
    #[serde(default)]
    args: Vec<Arg>,
}

impl CodeSpec {
    /// Recognizes which of the three shapes a raw positional argument uses.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            let t: StructuredTriple = serde_json::from_str(trimmed)
                .map_err(|e| Error::ArgParseError(format!("invalid structured code `{raw}`: {e}")))?;
            Ok(CodeSpec::Structured { module: t.module, function: t.function, args: t.args })
        } else if trimmed.ends_with('.') {
            Ok(CodeSpec::Expression(trimmed.to_string()))
        } else {
            Ok(CodeSpec::Trace(PathBuf::from(raw)))
        }
    }

    /// Resolves this code specification against the built-in registry, producing a
    /// runner object and its display name.
    pub(crate) fn resolve(&self) -> Result<(String, Arc<dyn Runner>), Error> {
        match self {
            CodeSpec::Expression(expr) => {
                let (module, function, args) = parse_expression(expr)?;
                let name = format!("{module}:{function}({args_disp})", args_disp = display_args(&args));
                let runner = registry::lookup(&module, &function, &args)?;
                Ok((name, runner))
            }
            CodeSpec::Structured { module, function, args } => {
                let name = format!("{module}:{function}({args_disp})", args_disp = display_args(args));
                let runner = registry::lookup(module, function, args)?;
                Ok((name, runner))
            }
            CodeSpec::Trace(path) => {
                let trace = crate::trace::load(path)?;
                let name = path.display().to_string();
                Ok((name, Arc::new(trace) as Arc<dyn Runner>))
            }
        }
    }
}

fn display_args(args: &[Arg]) -> String {
    args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

/// Parses the `module:function(arg1, arg2).` expression syntax.
///
/// This mirrors an Erlang-shell-style call: a trailing `.` marks statement end,
/// `module:function` addresses a registry entry, and parenthesized arguments are
/// integer, float, or bareword/quoted string literals.
fn parse_expression(expr: &str) -> Result<(String, String, Vec<Arg>), Error> {
    let body = expr.strip_suffix('.').unwrap_or(expr);
    let open = body
        .find('(')
        .ok_or_else(|| Error::ArgParseError(format!("expected `(` in expression `{expr}`")))?;
    let close = body
        .rfind(')')
        .ok_or_else(|| Error::ArgParseError(format!("expected `)` in expression `{expr}`")))?;
    if close < open {
        return Err(Error::ArgParseError(format!("mismatched parentheses in `{expr}`")));
    }

    let head = &body[..open];
    let args_str = &body[open + 1..close];

    let (module, function) = match head.split_once(':') {
        Some((m, f)) => (m.to_string(), f.to_string()),
        None => ("core".to_string(), head.to_string()),
    };

    let args = args_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_arg)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((module, function, args))
}

fn parse_arg(raw: &str) -> Result<Arg, Error> {
    let raw = raw.trim();
    if let Some(unquoted) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Arg::Str(unquoted.to_string()));
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Arg::Int(n));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Ok(Arg::Float(f));
    }
    Ok(Arg::Str(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expression_shape() {
        let spec = CodeSpec::parse("core:sleep(1).").unwrap();
        assert!(matches!(spec, CodeSpec::Expression(_)));
    }

    #[test]
    fn parses_structured_shape() {
        let spec = CodeSpec::parse(r#"{"module": "core", "function": "sleep", "args": [1]}"#).unwrap();
        match spec {
            CodeSpec::Structured { module, function, args } => {
                assert_eq!(module, "core");
                assert_eq!(function, "sleep");
                assert_eq!(args, vec![Arg::Int(1)]);
            }
            _ => panic!("expected structured spec"),
        }
    }

    #[test]
    fn falls_back_to_trace_path() {
        let spec = CodeSpec::parse("traces/recorded.json").unwrap();
        assert!(matches!(spec, CodeSpec::Trace(_)));
    }

    #[test]
    fn expression_without_module_defaults_to_core() {
        let (module, function, args) = parse_expression("sleep(5).").unwrap();
        assert_eq!(module, "core");
        assert_eq!(function, "sleep");
        assert_eq!(args, vec![Arg::Int(5)]);
    }

    #[test]
    fn parses_string_args() {
        let (_, _, args) = parse_expression(r#"group:create("foo")."#).unwrap();
        assert_eq!(args, vec![Arg::Str("foo".into())]);
    }

    #[test]
    fn bareword_args_fall_back_to_string() {
        let (_, _, args) = parse_expression("group:create(foo).").unwrap();
        assert_eq!(args, vec![Arg::Str("foo".into())]);
    }
}

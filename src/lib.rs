//! A micro-benchmark harness and concurrency-saturation explorer for code snippets
//! executed inside a managed language runtime.
//!
//! The library is organized leaves-first: a lock-free [`counter`], the [`job`]
//! control plane that owns a dynamic worker pool around a [`code::Runner`], the
//! [`sampler`] that reads counters at fixed intervals, the [`squeeze`] search that
//! sweeps worker count looking for the throughput knee, and the [`executor`] that
//! ties a CLI invocation to one or more jobs.
#![deny(missing_docs)]

mod bridge;
mod code;
mod counter;
mod error;
mod executor;
mod fragment;
mod job;
mod registry;
mod report;
mod reporter;
mod sampler;
mod squeeze;
mod trace;
mod util;

pub mod cli;

pub use crate::{
    code::{Arg, CodeSpec, Runner},
    error::Error,
    executor::{RunOptions, RunOutcome, compare, run},
    fragment::CodeFragment,
    job::Job,
    sampler::{JobSamples, ReportMode, SampleOptions},
    squeeze::{SqueezeOptions, SqueezeResult, SqueezeStep},
};

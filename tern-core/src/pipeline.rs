//! Pass pipeline.
//!
//! Runs the lowering passes over a whole program, optionally to a fixed point,
//! and keeps the per-body metadata contract honest:
//! - Before each pass every body's validation flag is armed, and after it the
//!   pass must have declared what it preserved (checked in debug builds).
//! - After each pass the verifier runs when `verify` is set.
//! - After each pass the analyses in `require_metadata` are recomputed for
//!   every body where the pass invalidated them.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{CompilerError, Result};
use crate::ir::metadata::MetadataSet;
use crate::ir::verify::verify_program;
use crate::ir::Program;
use crate::lower_subroutines::lower_subroutines_body;
use crate::registry::SubroutineRegistry;
use crate::split_var_copies::split_var_copies_body;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    SplitVarCopies,
    LowerSubroutines,
}

impl PassKind {
    /// Passes run when none are configured, in order.
    pub const DEFAULT_ORDER: [PassKind; 2] = [PassKind::SplitVarCopies, PassKind::LowerSubroutines];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::SplitVarCopies => "split-var-copies",
            PassKind::LowerSubroutines => "lower-subroutines",
        }
    }

    /// Run this pass over every body, checking each one declared its metadata.
    pub fn run(self, program: &mut Program, registry: &SubroutineRegistry) -> bool {
        let Program {
            variables, functions, ..
        } = program;

        let mut progress = false;
        for function in functions.values_mut() {
            for sig in function.overloads.iter_mut() {
                let Some(body) = sig.body.as_mut() else { continue };
                body.metadata.set_validation_flag();
                let changed = match self {
                    PassKind::SplitVarCopies => split_var_copies_body(variables, body),
                    PassKind::LowerSubroutines => lower_subroutines_body(variables, registry, body),
                };
                body.metadata.check_validation_flag(self.name());
                if changed {
                    debug!("{}: changed {}", self.name(), function.name);
                }
                progress |= changed;
            }
        }
        progress
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Passes to run, in order.
    pub passes: Vec<PassKind>,
    /// Re-run the pass list until no pass makes progress.
    pub fixed_point: bool,
    /// Upper bound on pass-list iterations in fixed-point mode.
    pub max_iterations: usize,
    /// Run the IR verifier after every pass.
    pub verify: bool,
    /// Analyses guaranteed valid in every body after each pass.
    pub require_metadata: MetadataSet,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            passes: PassKind::DEFAULT_ORDER.to_vec(),
            fixed_point: false,
            max_iterations: 8,
            verify: cfg!(debug_assertions),
            require_metadata: MetadataSet::NONE,
        }
    }
}

/// One execution of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassRun {
    pub pass: PassKind,
    pub iteration: usize,
    pub progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub runs: Vec<PassRun>,
    /// Number of times the pass list was run.
    pub iterations: usize,
    /// Whether any pass changed the program.
    pub progress: bool,
    /// Number of analyses (block index, dominance) computed across all bodies.
    pub metadata_recomputed: usize,
}

pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline { options }
    }

    pub fn run(&self, program: &mut Program) -> Result<PipelineReport> {
        let registry = SubroutineRegistry::from_program(program);
        debug!("Subroutine registry has {} implementations", registry.len());

        let mut report = PipelineReport::default();
        loop {
            report.iterations += 1;
            let iteration = report.iterations;
            let mut changed = false;

            for &pass in &self.options.passes {
                let progress = pass.run(program, &registry);
                if progress {
                    info!("{} made progress (iteration {})", pass, iteration);
                } else {
                    debug!("{} made no progress (iteration {})", pass, iteration);
                }
                report.runs.push(PassRun {
                    pass,
                    iteration,
                    progress,
                });
                changed |= progress;

                if self.options.verify {
                    verify_program(program).map_err(|errors| CompilerError::VerificationError {
                        pass: pass.name().to_string(),
                        errors,
                    })?;
                }
                report.metadata_recomputed += self.require_metadata(program);
            }

            report.progress |= changed;
            if !self.options.fixed_point || !changed {
                break;
            }
            if iteration >= self.options.max_iterations {
                warn!("Pipeline still making progress after {} iterations, stopping", iteration);
                break;
            }
        }
        Ok(report)
    }

    /// Recompute required analyses. Returns how many were computed.
    fn require_metadata(&self, program: &mut Program) -> usize {
        let required = self.options.require_metadata;
        if required.is_empty() {
            return 0;
        }
        let mut count = 0;
        for body in program.bodies_mut() {
            let recomputed = body.require_metadata(required);
            if !recomputed.is_empty() {
                debug!("Recomputed metadata {:?}", recomputed);
            }
            count += recomputed.block_index as usize + recomputed.dominance as usize;
        }
        count
    }
}

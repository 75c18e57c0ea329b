//! Schedule synthesis.
//!
//! The scheduler starts from a legal schedule and asks a [`SearchPolicy`]
//! for candidate transformations. Each candidate is applied to the current
//! schedule and validated against the original dependences. It either
//! replaces the current schedule whole or is discarded. The loop stops when
//! the policy runs out of proposals or after a bounded number of attempts,
//! so synthesis always ends with a legal schedule.

use crate::analysis::DependenceSet;
use crate::ir::pir::PolyProgram;
use crate::transform::legality::{self, tilable_dims};
use crate::transform::schedule::{DimRole, Layout, Schedule};
use crate::transform::{Fusion, Tiling, Transform};
use crate::OptimizationConfig;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Default bound on proposals per synthesis run.
pub const DEFAULT_MAX_ATTEMPTS: usize = 16;

/// Source of candidate transformations.
pub trait SearchPolicy {
    /// Next candidate for `current`, or `None` to stop the search.
    fn propose(
        &mut self,
        program: &PolyProgram,
        deps: &DependenceSet,
        current: &Schedule,
    ) -> Option<Box<dyn Transform>>;

    /// Outcome of the last proposal.
    fn feedback(&mut self, _transform: &dyn Transform, _accepted: bool) {}
}

/// Fusion of adjacent sibling nests first, then tiling of untiled loop
/// bands, both in layout order. A candidate is proposed at most once.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicy {
    tile_sizes: Option<Vec<i64>>,
    enable_fusion: bool,
    tried: BTreeSet<String>,
}

impl DefaultPolicy {
    /// Policy tiling with `tile_sizes` when given.
    pub fn new(tile_sizes: Option<Vec<i64>>, enable_fusion: bool) -> Self {
        Self { tile_sizes, enable_fusion, tried: BTreeSet::new() }
    }

    fn fusion_candidates(schedule: &Schedule, node: &Layout, out: &mut Vec<Fusion>) {
        match node {
            Layout::Band { child, .. } => Self::fusion_candidates(schedule, child, out),
            Layout::Split { dim, children } => {
                if *dim < schedule.len() {
                    for pair in children.windows(2) {
                        out.push(Fusion::new(pair[0].members(), pair[1].members(), *dim));
                    }
                }
                for child in children {
                    Self::fusion_candidates(schedule, child, out);
                }
            }
            Layout::Leaf(_) => {}
        }
    }

    fn tiling_candidates(
        &self,
        sizes: &[i64],
        schedule: &Schedule,
        deps: &DependenceSet,
        node: &Layout,
        tiled_above: bool,
        out: &mut Vec<Tiling>,
    ) {
        match node {
            Layout::Band { dims, role, members, child } => {
                if *role == DimRole::Loop && !tiled_above {
                    // A dimension that cannot be tiled stays outside; the
                    // band is split after it and the rest retried.
                    let mut rest = dims.as_slice();
                    while !rest.is_empty() {
                        let flags = tilable_dims(schedule, deps, members, rest);
                        let run = flags.iter().take_while(|&&f| f).count();
                        if run > 0 {
                            let band = rest[..run].to_vec();
                            let sizes = Tiling::sizes_for(sizes, run);
                            out.push(Tiling::new(members.clone(), band, sizes));
                            break;
                        }
                        rest = &rest[1..];
                    }
                }
                let tiled = tiled_above || matches!(role, DimRole::Tile | DimRole::Point);
                self.tiling_candidates(sizes, schedule, deps, child, tiled, out);
            }
            Layout::Split { children, .. } => {
                for child in children {
                    self.tiling_candidates(sizes, schedule, deps, child, tiled_above, out);
                }
            }
            Layout::Leaf(_) => {}
        }
    }
}

impl SearchPolicy for DefaultPolicy {
    fn propose(
        &mut self,
        _program: &PolyProgram,
        deps: &DependenceSet,
        current: &Schedule,
    ) -> Option<Box<dyn Transform>> {
        let layout = current.layout();
        let mut candidates: Vec<Box<dyn Transform>> = Vec::new();
        if self.enable_fusion {
            let mut fusions = Vec::new();
            Self::fusion_candidates(current, &layout, &mut fusions);
            candidates.extend(fusions.into_iter().map(|f| Box::new(f) as Box<dyn Transform>));
        }
        if let Some(sizes) = &self.tile_sizes {
            let mut tilings = Vec::new();
            self.tiling_candidates(sizes, current, deps, &layout, false, &mut tilings);
            candidates.extend(tilings.into_iter().map(|t| Box::new(t) as Box<dyn Transform>));
        }
        let next = candidates.into_iter().find(|c| !self.tried.contains(&c.describe()))?;
        self.tried.insert(next.describe());
        Some(next)
    }
}

/// Polyhedral scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Tile sizes (if tiling enabled)
    tile_sizes: Option<Vec<i64>>,
    /// Enable fusion
    enable_fusion: bool,
    /// Enable parallelism marking
    enable_parallel: bool,
    /// Bound on proposals
    max_attempts: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Scheduler with fusion and parallel marking, without tiling.
    pub fn new() -> Self {
        Self {
            tile_sizes: None,
            enable_fusion: true,
            enable_parallel: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Scheduler matching an optimization configuration.
    pub fn from_config(config: &OptimizationConfig) -> Self {
        Self {
            tile_sizes: config.enable_tiling.then(|| config.tile_sizes.clone()),
            enable_fusion: config.enable_fusion,
            enable_parallel: config.mark_parallel,
            max_attempts: config.max_attempts,
        }
    }

    /// Tile permutable bands with these sizes.
    pub fn with_tiling(mut self, tile_sizes: Vec<i64>) -> Self {
        self.tile_sizes = Some(tile_sizes);
        self
    }

    /// Enable or disable fusion of sibling nests.
    pub fn with_fusion(mut self, enable: bool) -> Self {
        self.enable_fusion = enable;
        self
    }

    /// Enable or disable parallel marks.
    pub fn with_parallelism(mut self, enable: bool) -> Self {
        self.enable_parallel = enable;
        self
    }

    /// Bound the number of candidate transformations tried.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Schedule a program with the default search policy.
    pub fn schedule(&self, program: &PolyProgram, deps: &DependenceSet, initial: Option<&Schedule>) -> Schedule {
        let mut policy = DefaultPolicy::new(self.tile_sizes.clone(), self.enable_fusion);
        self.schedule_with(program, deps, initial, &mut policy)
    }

    /// Schedule a program with a custom search policy.
    pub fn schedule_with(
        &self,
        program: &PolyProgram,
        deps: &DependenceSet,
        initial: Option<&Schedule>,
        policy: &mut dyn SearchPolicy,
    ) -> Schedule {
        let mut current = self.starting_point(program, deps, initial);
        info!(
            "scheduling {}: {} statements, {} dependences",
            program.name,
            program.statements.len(),
            deps.len()
        );
        for _ in 0..self.max_attempts {
            let Some(transform) = policy.propose(program, deps, &current) else {
                break;
            };
            let accepted = match transform.apply(&current) {
                Some(candidate) if candidate.covers(program) && transform.is_legal(&candidate, deps) => {
                    info!("accepted {}", transform.describe());
                    current = candidate;
                    true
                }
                Some(_) => {
                    debug!("rejected {}: violates a dependence", transform.describe());
                    false
                }
                None => {
                    debug!("skipped {}: not applicable", transform.describe());
                    false
                }
            };
            policy.feedback(transform.as_ref(), accepted);
        }
        legality::annotate(&mut current, deps, self.enable_parallel);
        current
    }

    fn starting_point(&self, program: &PolyProgram, deps: &DependenceSet, initial: Option<&Schedule>) -> Schedule {
        let Some(schedule) = initial else {
            return Schedule::identity(program);
        };
        if !schedule.covers(program) {
            warn!("initial schedule does not cover {}; using the identity schedule", program.name);
            return Schedule::identity(program);
        }
        if !legality::is_legal(schedule, deps) {
            warn!("initial schedule violates a dependence; using the identity schedule");
            return Schedule::identity(program);
        }
        let mut start = schedule.clone();
        start.clear_marks();
        start
    }
}

/// Synthesize a legal schedule with the default configuration.
///
/// Never fails: at worst the result is the identity schedule, annotated.
pub fn synthesize(program: &PolyProgram, deps: &DependenceSet, initial: Option<&Schedule>) -> Schedule {
    Scheduler::from_config(&OptimizationConfig::default()).schedule(program, deps, initial)
}

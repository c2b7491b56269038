//! Pass infrastructure
//!
//! A `PassGroup` is an ordered list of named single-function passes. Running
//! the group executes each pass exactly once in registration order; there is
//! no fixpoint iteration, so callers that want convergence register passes
//! repeatedly (fold, propagate, fold, ...).

use crate::function::Function;
use crate::passes::{self, DotConfig, SelectConfig};
use crate::verify::verify_function;
use klr_common::IrError;
use log::debug;

/// Settings shared by configurable passes
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub select: SelectConfig,
    pub dot: DotConfig,
}

pub struct Pass {
    name: String,
    run: Box<dyn Fn(&mut Function)>,
}

impl Pass {
    pub fn new(name: impl Into<String>, run: impl Fn(&mut Function) + 'static) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.name).finish()
    }
}

#[derive(Debug, Default)]
pub struct PassGroup {
    passes: Vec<Pass>,
}

/// Names accepted by `PassGroup::from_names`
pub const PASS_NAMES: &[&str] = &[
    "remove-load",
    "remove-store",
    "remove-unused",
    "constant-folding",
    "constant-propagation",
    "remove-unreachable-block",
    "remove-only-jump-block",
    "insn-select",
    "text",
    "dot",
];

/// The pipeline that reduces straight-line code to its constant result
pub const DEFAULT_PIPELINE: &[&str] = &[
    "remove-load",
    "remove-store",
    "constant-folding",
    "constant-propagation",
    "constant-folding",
    "constant-propagation",
    "constant-folding",
    "remove-unused",
    "remove-unreachable-block",
    "remove-only-jump-block",
];

impl PassGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Look up a registered pass by name
    pub fn lookup(name: &str, options: &PassOptions) -> Result<Pass, IrError> {
        let pass = match name {
            "remove-load" => Pass::new(name, passes::remove_load),
            "remove-store" => Pass::new(name, passes::remove_store),
            "remove-unused" => Pass::new(name, passes::remove_unused),
            "constant-folding" => Pass::new(name, passes::constant_folding),
            "constant-propagation" => Pass::new(name, passes::constant_propagation),
            "remove-unreachable-block" => Pass::new(name, passes::remove_unreachable_blocks),
            "remove-only-jump-block" => Pass::new(name, passes::remove_only_jump_blocks),
            "insn-select" => {
                let config = options.select.clone();
                Pass::new(name, move |func| passes::select_instructions(func, &config))
            }
            "text" => Pass::new(name, passes::text),
            "dot" => {
                let config = options.dot.clone();
                Pass::new(name, move |func| passes::write_dot(func, &config))
            }
            _ => return Err(IrError::UnknownPass(name.to_string())),
        };
        Ok(pass)
    }

    pub fn from_names<S: AsRef<str>>(names: &[S], options: &PassOptions) -> Result<Self, IrError> {
        let mut group = Self::new();
        for name in names {
            group.add(Self::lookup(name.as_ref(), options)?);
        }
        Ok(group)
    }

    pub fn run(&self, func: &mut Function) {
        for pass in &self.passes {
            debug!("running pass '{}' on '{}'", pass.name, func.name);
            (pass.run)(func);
            if cfg!(debug_assertions) {
                if let Err(err) = verify_function(func) {
                    panic!("pass '{}' broke '{}': {}", pass.name, func.name, err);
                }
            }
        }
    }
}

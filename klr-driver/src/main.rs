//! Koala IR Optimizer Driver
//!
//! Runs pass pipelines over the built-in sample functions, prints the result
//! and optionally register-allocates and dumps the finalized stream as JSON.

use clap::{Parser, Subcommand, ValueEnum};
use klr_ir::passes::{DotConfig, SelectConfig};
use klr_ir::regalloc::{LinearScanAllocator, RegisterAllocator, UniqueAllocator, MAX_REGISTERS};
use klr_ir::{
    finalize, print_function, samples, FinalizedFunction, Module, PassGroup, PassOptions,
    DEFAULT_PIPELINE, PASS_NAMES,
};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klrc")]
#[command(about = "Koala IR optimizer")]
#[command(version = "0.1.0")]
struct Cli {
    /// Log pass activity (RUST_LOG also works)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Allocator {
    Linear,
    Unique,
}

#[derive(Subcommand)]
enum Commands {
    /// List sample functions and pass names
    List,

    /// Run a pass pipeline over sample functions
    Run {
        /// Sample function to process; all samples when omitted
        #[arg(short, long)]
        function: Option<String>,

        /// Comma separated pass names, in order
        #[arg(short, long, value_delimiter = ',')]
        passes: Option<Vec<String>>,

        /// Print each function before running the passes
        #[arg(long)]
        print_before: bool,

        /// Allocate registers after the passes
        #[arg(long, value_enum)]
        allocator: Option<Allocator>,

        /// Size of the register file for the linear scan allocator
        #[arg(long, default_value_t = MAX_REGISTERS)]
        registers: usize,

        /// Directory for the `dot` pass output
        #[arg(long, default_value = ".")]
        dot_dir: PathBuf,

        /// Render `.dot` files to PDF with graphviz
        #[arg(long)]
        render: bool,

        /// Largest integer encodable as an immediate by `insn-select`
        #[arg(long, default_value_t = i8::MAX as i64, value_parser = clap::value_parser!(i64).range(0..))]
        imm_max: i64,

        /// Write the finalized instruction streams as JSON (needs --allocator)
        #[arg(long)]
        emit_json: Option<PathBuf>,
    },
}

struct RunOptions {
    function: Option<String>,
    passes: Vec<String>,
    print_before: bool,
    allocator: Option<Allocator>,
    registers: usize,
    pass_options: PassOptions,
    emit_json: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::List => list(),
        Commands::Run {
            function,
            passes,
            print_before,
            allocator,
            registers,
            dot_dir,
            render,
            imm_max,
            emit_json,
        } => {
            let select = select_config(imm_max);
            let options = RunOptions {
                function,
                passes: passes
                    .unwrap_or_else(|| DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect()),
                print_before,
                allocator,
                registers,
                pass_options: PassOptions {
                    select,
                    dot: DotConfig {
                        dir: dot_dir,
                        render,
                    },
                },
                emit_json,
            };
            if let Err(e) = run(options) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Immediate range `[-imm_max - 1, imm_max]`; clap keeps `imm_max` non-negative
fn select_config(imm_max: i64) -> SelectConfig {
    SelectConfig {
        imm_max,
        imm_min: -imm_max - 1,
        ..SelectConfig::default()
    }
}

fn list() {
    println!("Sample functions:");
    for name in samples::SAMPLE_NAMES {
        println!("  {}", name);
    }
    println!("\nPasses:");
    for name in PASS_NAMES {
        println!("  {}", name);
    }
    println!("\nDefault pipeline: {}", DEFAULT_PIPELINE.join(","));
}

fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut module: Module = samples::sample_module()?;
    let group = PassGroup::from_names(options.passes.as_slice(), &options.pass_options)?;
    debug!("pipeline: {}", group.names().join(", "));

    let targets = match &options.function {
        Some(name) => vec![module.function_by_name(name)?],
        None => module.functions.iter().map(|f| f.id).collect(),
    };
    if options.emit_json.is_some() && options.allocator.is_none() {
        return Err("--emit-json needs --allocator".into());
    }

    let mut streams: Vec<FinalizedFunction> = Vec::new();
    for fid in targets {
        let func = module.function_mut(fid);
        if options.print_before {
            println!("; before\n{}", print_function(func));
        }

        group.run(func);
        println!("{}", print_function(func));

        let Some(kind) = options.allocator else {
            continue;
        };
        let allocation = match kind {
            Allocator::Linear => {
                if options.registers > MAX_REGISTERS {
                    return Err(format!("at most {} registers", MAX_REGISTERS).into());
                }
                LinearScanAllocator::with_registers(options.registers).allocate(func)?
            }
            Allocator::Unique => UniqueAllocator.allocate(func)?,
        };
        info!(
            "'{}' uses {} registers",
            func.name, allocation.registers_used
        );
        let params: Vec<String> = func
            .params()
            .iter()
            .filter_map(|p| allocation.interval(*p))
            .filter_map(|i| i.reg.map(|reg| format!("{}=r{}", func.display_name(i.value), reg)))
            .collect();
        if !params.is_empty() {
            println!(";   params {}", params.join(" "));
        }
        for interval in &allocation.intervals {
            if let Some(reg) = interval.reg {
                println!(
                    ";   r{:<3} {} [{}, {})",
                    reg,
                    func.display_name(interval.value),
                    interval.start,
                    interval.end
                );
            }
        }
        streams.push(finalize(func)?);
    }

    if let Some(path) = &options.emit_json {
        let json = serde_json::to_string_pretty(&streams)?;
        fs::write(path, json)?;
        println!("Instruction streams written to: {}", path.display());
    }
    Ok(())
}

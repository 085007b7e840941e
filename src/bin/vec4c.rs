//! Compile a text IR program for a vec4 device.
//!
//! Usage: `vec4c <input.vir> [--gen 6|7|8] [--grf-count N] [--no-opt] [--no-split] [--dump-opt] [-v]`

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info};

use vec4c::core::DeviceInfo;
use vec4c::test_ir::{parse_program, render, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "vec4c")]
#[command(about = "Optimize and register-allocate a vec4 text IR program")]
struct Args {
    /// Text IR input file
    input: PathBuf,

    /// Device generation preset
    #[arg(long = "gen", default_value_t = 7, value_parser = clap::value_parser!(u32).range(6..=8))]
    generation: u32,

    /// Override the number of general registers
    #[arg(long = "grf-count")]
    grf_count: Option<u32>,

    /// Skip the optimization loop
    #[arg(long = "no-opt")]
    no_opt: bool,

    /// Keep multi-unit registers whole
    #[arg(long = "no-split")]
    no_split: bool,

    /// Print the program after optimization and stop
    #[arg(long = "dump-opt")]
    dump_opt: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn run_options(&self) -> Result<RunOptions, String> {
        let mut devinfo =
            DeviceInfo::for_generation(self.generation).ok_or_else(|| format!("no gen{} preset", self.generation))?;
        if let Some(count) = self.grf_count {
            devinfo = devinfo.with_grf_count(count);
        }
        let mut options = RunOptions {
            devinfo,
            dump_opt: self.dump_opt,
            ..RunOptions::default()
        };
        options.compile.optimize = !self.no_opt;
        options.compile.split_registers = !self.no_split;
        Ok(options)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = match args.run_options() {
        Ok(options) => options,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };

    let text = match fs::read_to_string(&args.input) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read {}: {}", args.input.display(), e);
            process::exit(1);
        }
    };
    let program = match parse_program(&text) {
        Ok(program) => program,
        Err(e) => {
            error!("{}:{}", args.input.display(), e);
            process::exit(1);
        }
    };

    info!("compiling {} for {}", args.input.display(), options.devinfo.name);
    match render(&options, program) {
        Ok(out) => print!("{out}"),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use weaver::vm::{Exit, Severity, bytecode};
use weaver::{ConfigFile, Program, SyscallMode, Vm, WorldHost};

#[derive(Parser)]
#[command(name = "weaver")]
#[command(about = "Run and inspect spell bytecode", long_about = None)]
struct Cli {
    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a spell program (.json or bytecode)
    Run {
        file: PathBuf,

        /// TOML config with [runtime] and [world] tables
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instructions between garbage collections (0 = never)
        #[arg(long)]
        gc_interval: Option<u64>,

        /// Fault on unknown syscall codes
        #[arg(long)]
        strict_syscalls: bool,

        /// Stop with an error after this many instructions
        #[arg(long)]
        budget: Option<u64>,

        /// Print the final operand stack
        #[arg(long)]
        stack: bool,

        /// Print GC statistics
        #[arg(long)]
        gc_stats: bool,
    },
    /// Print a program listing
    Disasm { file: PathBuf },
    /// Report suspicious instructions without running
    Check { file: PathBuf },
    /// Convert a JSON program to bytecode
    Assemble { input: PathBuf, output: PathBuf },
    /// Step through a program interactively
    #[cfg(feature = "debugger")]
    Debug {
        file: PathBuf,

        /// TOML config with [runtime] and [world] tables
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match run_command(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn install_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<ExitCode, String> {
    match command {
        Commands::Run {
            file,
            config,
            gc_interval,
            strict_syscalls,
            budget,
            stack,
            gc_stats,
        } => {
            let program = load_program(&file)?;
            let mut settings = load_config(config.as_deref())?;
            if let Some(interval) = gc_interval {
                settings.runtime.gc_interval = interval;
            }
            if strict_syscalls {
                settings.runtime.syscall_mode = SyscallMode::Strict;
            }

            let host = WorldHost::new(settings.world).with_echo(Box::new(io::stdout()));
            let mut vm = Vm::with_config(host, settings.runtime);
            let outcome = execute(&mut vm, program, budget);
            let _ = io::stdout().flush();

            if stack {
                let values: Vec<String> =
                    vm.stack().as_slice().iter().map(|v| v.to_string()).collect();
                println!("stack: [{}]", values.join(", "));
            }
            if gc_stats {
                let stats = vm.gc_stats();
                eprintln!(
                    "[GC] cycles: {}, arrays freed: {}, peak live: {}, steps: {}",
                    stats.cycles,
                    stats.arrays_freed,
                    stats.peak_live,
                    vm.steps()
                );
            }
            outcome?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Disasm { file } => {
            let program = load_program(&file)?;
            print!("{}", program.listing());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { file } => {
            let program = load_program(&file)?;
            let diagnostics = program.check();
            for d in &diagnostics {
                println!("{}", d);
            }
            let errors = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count();
            if errors > 0 {
                return Ok(ExitCode::FAILURE);
            }
            if diagnostics.is_empty() {
                println!("No problems found.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Assemble { input, output } => {
            let program = load_program(&input)?;
            fs::write(&output, bytecode::serialize(&program))
                .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
            println!(
                "wrote {} instructions to {}",
                program.len(),
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "debugger")]
        Commands::Debug { file, config } => {
            let program = load_program(&file)?;
            let settings = load_config(config.as_deref())?;
            weaver::debugger::run_debugger(program, settings.runtime, settings.world)
                .map_err(|e| e.to_string())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run to completion, or until `budget` instructions have executed.
fn execute(vm: &mut Vm<WorldHost>, program: Program, budget: Option<u64>) -> Result<(), String> {
    let Some(budget) = budget else {
        return vm.run(&program).map(|_| ()).map_err(|f| f.to_string());
    };

    vm.load(program);
    let mut remaining = budget;
    loop {
        let progress = vm.resume(remaining);
        remaining -= progress.executed;
        match progress.exit {
            Exit::Halted => return Ok(()),
            Exit::Faulted(fault) => return Err(fault.to_string()),
            Exit::BudgetExhausted => {
                return Err(format!("instruction budget of {} exhausted", budget));
            }
            Exit::Paused(_) => {}
        }
    }
}

/// Load a program, detecting bytecode by its magic.
fn load_program(path: &Path) -> Result<Program, String> {
    let data = fs::read(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    if bytecode::is_bytecode(&data) {
        return bytecode::deserialize(&data)
            .map_err(|e| format!("{}: bytecode error: {}", path.display(), e));
    }
    let text = String::from_utf8(data)
        .map_err(|_| format!("{}: neither bytecode nor UTF-8 JSON", path.display()))?;
    Program::from_json(&text).map_err(|e| format!("{}: invalid program: {}", path.display(), e))
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile, String> {
    match path {
        Some(path) => ConfigFile::load(path).map_err(|e| e.to_string()),
        None => Ok(ConfigFile::default()),
    }
}

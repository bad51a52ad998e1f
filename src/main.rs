use clap::{ArgAction, Parser, Subcommand};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::path::PathBuf;
use xcode::commands::{self, ConversionArgs, ExitStatus};
use xcode::CancelToken;

#[derive(Parser)]
#[command(
    name = "xcode",
    about = "Encrypt and decrypt files using the XCODE utility algorithm",
    long_about = "Encrypt and decrypt files using the XCODE utility algorithm.\n\n\
        XCODE obfuscates source files with an ASCII key of at most 8 characters \
        (default \"Progress\"). It is not a standard cryptography method and must \
        not be relied on for security."
)]
struct Cli {
    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only print results and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt files. Prints `source >> destination` per converted file, `source !! cause` per failure
    #[command(visible_alias = "en")]
    Encrypt {
        #[command(flatten)]
        args: ConversionArgs,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Decrypt files. Prints `source >> destination` per converted file, `source !! cause` per failure
    #[command(visible_alias = "de")]
    Decrypt {
        #[command(flatten)]
        args: ConversionArgs,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// List only encrypted (or decrypted) files
    #[command(visible_alias = "li")]
    List {
        /// List decrypted files instead of encrypted ones
        #[arg(short, long)]
        decrypted: bool,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Show the XCODE header of a file
    Info {
        file: PathBuf,
    },
}

// ── stderr logger ────────────────────────────────────────────────────────────

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn  => "WARN ",
            Level::Info  => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = writeln!(io::stderr().lock(), "[{tag}] {}", record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, 2) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    let logger = Box::new(StderrLogger { level });
    if log::set_boxed_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let cancel = CancelToken::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let status = match cli.command {
        Commands::Encrypt { args, files } => commands::encrypt(&files, &args, &cancel, &mut out),
        Commands::Decrypt { args, files } => commands::decrypt(&files, &args, &cancel, &mut out),
        Commands::List { decrypted, files } => commands::list(&files, decrypted, &mut out),
        Commands::Info { file } => commands::info(&file, &mut out),
    };

    let code = match status {
        Ok(s) => s.code(),
        Err(e) => {
            eprintln!("error: {e}");
            ExitStatus::Fatal.code()
        }
    };
    let _ = out.flush();
    std::process::exit(code);
}

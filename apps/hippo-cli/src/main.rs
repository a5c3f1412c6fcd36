//! `hippo_t2`: 左右海马平均 T2 定量.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use hippo_t2::pipeline::{self, InputSet, PipelineConfig};
use hippo_t2::toolkit::{RegistrationStrategy, ToolPaths};
use hippo_t2::{PipelineError, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;

const USAGE: &str = "hippo_t2 -T1 <path> -seg_L <path> -seg_R <path> -T2map <path> \
[-out <dir>] [-tmp <dir>] [-T2_thr <ms>] [-vis] [-reg <psf|direct>] [-strict] [-v]";

/// Mean hippocampal T2 from a T2 map and left/right hippocampal segmentations.
#[derive(Debug, Parser)]
#[command(name = "hippo_t2", version, override_usage = USAGE)]
struct Cli {
    /// T1-weighted structural image
    #[arg(long = "T1", value_name = "path")]
    t1: Option<PathBuf>,

    /// Left hippocampus segmentation, in T1 space
    #[arg(long = "seg_L", value_name = "path")]
    seg_l: Option<PathBuf>,

    /// Right hippocampus segmentation, in T1 space
    #[arg(long = "seg_R", value_name = "path")]
    seg_r: Option<PathBuf>,

    /// T2 relaxation map (ms)
    #[arg(long = "T2map", value_name = "path")]
    t2map: Option<PathBuf>,

    /// Output directory [default: current directory]
    #[arg(long = "out", value_name = "dir", allow_hyphen_values = true)]
    out: Option<PathBuf>,

    /// Temporary directory [default: <out>/tmp]
    #[arg(long = "tmp", value_name = "dir", allow_hyphen_values = true)]
    tmp: Option<PathBuf>,

    /// Upper T2 limit for CSF exclusion, in ms [default: 170]
    #[arg(long = "T2_thr", value_name = "ms", allow_negative_numbers = true)]
    t2_thr: Option<String>,

    /// Open the T2 map with both masks in fsleyes when done
    #[arg(long = "vis")]
    vis: bool,

    /// Registration backend: psf (NiftyReg) or direct (FSL) [default: psf]
    #[arg(long = "reg", value_name = "psf|direct")]
    reg: Option<String>,

    /// Fail when either corrected mask is empty (the report is still written)
    #[arg(long = "strict")]
    strict: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn inputs(&self) -> InputSet {
        InputSet {
            t1: self.t1.clone(),
            t2map: self.t2map.clone(),
            seg_l: self.seg_l.clone(),
            seg_r: self.seg_r.clone(),
        }
    }

    fn strategy(&self) -> Result<RegistrationStrategy> {
        match &self.reg {
            Some(s) => s.parse(),
            None => utils::tools::strategy_from_env()
                .transpose()
                .map(Option::unwrap_or_default),
        }
    }

    fn config(&self, tools: ToolPaths) -> Result<PipelineConfig> {
        let mut config = PipelineConfig {
            output_dir: self.out.clone(),
            temp_dir: self.tmp.clone(),
            visualize: self.vis,
            require_samples: self.strict,
            strategy: self.strategy()?,
            tools,
            ..Default::default()
        };
        if let Some(thr) = &self.t2_thr {
            config.csf_threshold_ms = thr
                .trim()
                .parse()
                .map_err(|_| PipelineError::InvalidArgument("-T2_thr", thr.clone()))?;
        }
        Ok(config)
    }
}

/// 所有长选项名, 含 clap 自动生成的 `help` 与 `version`.
fn long_flags() -> Vec<String> {
    Cli::command()
        .get_arguments()
        .filter_map(|a| a.get_long())
        .chain(["help", "version"])
        .map(str::to_string)
        .collect()
}

/// 单横线的长选项 (`-T1`) 改写为双横线 (`--T1`).
///
/// 只改写已知的选项名, 其余参数 (`-v`, `-5`, 以 `-` 开头的目录名) 保持不变.
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    let flags = long_flags();
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let known = i > 0
                && arg
                    .to_str()
                    .and_then(|s| s.strip_prefix('-'))
                    .is_some_and(|name| flags.iter().any(|f| f == name));
            if known {
                let mut long = OsString::from("-");
                long.push(&arg);
                long
            } else {
                arg
            }
        })
        .collect()
}

fn print_usage<W: Write>(out: &mut W) {
    let _ = writeln!(out, "{}", Cli::command().render_help());
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Cannot initialize logging: {e}");
    }
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let config = cli.config(utils::tools::tool_paths_from_env_or_home())?;
    let outcome = pipeline::run(config.clone(), &cli.inputs())?;
    utils::framed_to(out, &outcome.record.render())?;
    outcome.check(&config)
}

/// 解析 `args`, 运行流水线. 用法说明与报告写入 `out`, 日志写入 stderr.
fn real_main<I, W>(args: I, mut out: W) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    let cli = match Cli::try_parse_from(normalize_args(args)) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = write!(out, "{}", e.render());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = writeln!(out, "{}", e.render());
            print_usage(&mut out);
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.verbose);

    match run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_usage_error() => {
            let _ = writeln!(out, "Error: {e}\n");
            print_usage(&mut out);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    real_main(std::env::args_os(), std::io::stdout().lock())
}

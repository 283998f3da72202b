use anyhow::{Context as _, Result};
use humantime::parse_duration;
use hostsys::clock;
use hostsys::config;
use hostsys::config::LogFormat;
use hostsys::env::{Environment, ProcessEnv};
use hostsys::fs::HostFs;
use hostsys::logging;
use hostsys::platform::NativeFs;
use hostsys::record::{StatRecord, Timespec};
use std::ffi::OsString;
use std::io::{Read as _, Write as _};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Opt {
    /// Configuration file; defaults to hostsys.yml in the current directory.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log output format (text or json); overrides the configuration.
    #[structopt(long)]
    log_format: Option<LogFormat>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Prints the metadata of a path without following symlinks.
    Stat {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Prints file, directory, other or missing.
    Kind {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Lists directory entries.
    Ls {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Writes the file content to stdout.
    Cat {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Replaces the file content with stdin.
    Put {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    Mkdir {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    Rmdir {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    Rm {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Lists the process environment.
    Env,

    /// Prints the value of an environment variable.
    Getenv {
        #[structopt(parse(from_os_str))]
        key: OsString,
    },

    /// Sleeps, then prints the monotonic and wall-clock seconds measured.
    ///
    /// Defaults to bench.interval from the configuration.
    Sleep {
        #[structopt(parse(try_from_str = parse_duration))]
        duration: Option<Duration>,
    },
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let cwd = std::env::current_dir().context("failed to get the current directory")?;
    let config = config::load_or_default(opt.config.as_deref(), &cwd)?;
    logging::init(opt.log_format.unwrap_or(config.logging.format));

    let fs = NativeFs::new(config.fs_options());
    tracing::debug!(options = ?fs.options(), "host filesystem ready");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match opt.command {
        Command::Stat { path } => {
            let record = fs
                .stat_details(&path)
                .with_context(|| format!("failed to stat {}", path.display()))?;
            print_record(&mut out, &record)?;
        }
        Command::Kind { path } => {
            writeln!(out, "{:?}", fs.path_kind(&path))?;
        }
        Command::Ls { path } => {
            let mut entries = fs
                .list_dir(&path)
                .with_context(|| format!("failed to list {}", path.display()))?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                writeln!(out, "{}", entry.name.to_string_lossy())?;
            }
        }
        Command::Cat { path } => {
            let content = fs
                .read_file(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            out.write_all(&content)?;
        }
        Command::Put { path } => {
            let mut content = vec![];
            std::io::stdin()
                .read_to_end(&mut content)
                .context("failed to read stdin")?;
            fs.write_file(&path, &content)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Command::Mkdir { path } => {
            fs.create_dir(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        Command::Rmdir { path } => {
            fs.remove_dir(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Command::Rm { path } => {
            fs.remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Command::Env => {
            for entry in ProcessEnv.vars() {
                writeln!(
                    out,
                    "{}={}",
                    entry.key.to_string_lossy(),
                    entry.value.to_string_lossy()
                )?;
            }
        }
        Command::Getenv { key } => match ProcessEnv.var(&key) {
            Some(value) => writeln!(out, "{}", value.to_string_lossy())?,
            None => anyhow::bail!("{} is not set", key.to_string_lossy()),
        },
        Command::Sleep { duration } => {
            let duration = duration.unwrap_or(*config.bench.interval);
            let instant = clock::Instant::now();
            let timer = clock::WallTimer::start();
            clock::sleep_seconds(duration.as_secs_f64());
            writeln!(out, "monotonic: {:.6}s", instant.elapsed_seconds())?;
            writeln!(out, "wall: {:.6}s", timer.elapsed_seconds())?;
        }
    }

    out.flush()?;
    Ok(())
}

fn print_record<W: std::io::Write>(out: &mut W, record: &StatRecord) -> Result<()> {
    fn ts(t: &Timespec) -> String {
        format!("{}.{:09}", t.sec, t.nsec)
    }

    writeln!(out, "kind:      {:?}", record.kind)?;
    writeln!(out, "mode:      {:o}", record.mode)?;
    writeln!(out, "size:      {}", record.size)?;
    writeln!(out, "dev:       {}", record.dev)?;
    writeln!(out, "ino:       {}", record.ino)?;
    writeln!(out, "nlink:     {}", record.nlink)?;
    writeln!(out, "uid:       {}", record.uid)?;
    writeln!(out, "gid:       {}", record.gid)?;
    writeln!(out, "rdev:      {}", record.rdev)?;
    writeln!(out, "blocks:    {}", record.blocks)?;
    writeln!(out, "blksize:   {}", record.blksize)?;
    writeln!(out, "atime:     {}", ts(&record.atime))?;
    writeln!(out, "mtime:     {}", ts(&record.mtime))?;
    writeln!(out, "ctime:     {}", ts(&record.ctime))?;
    writeln!(out, "birthtime: {}", ts(&record.birthtime))?;
    writeln!(out, "flags:     {:#x}", record.flags)?;
    writeln!(out, "gen:       {}", record.gen)?;
    Ok(())
}

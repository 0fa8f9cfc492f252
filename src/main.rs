use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use clap::Parser;
use log::{debug, info, warn};

use impel::ptrace::{self, PtraceTarget};
use impel::Tracee;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Run syscalls inside another process via ptrace injection.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Pid of the process to attach to.
    #[arg(short, long)]
    pid: libc::pid_t,

    /// Syscall number to run remotely after the getpid probe.
    #[arg(short, long)]
    nr: Option<i64>,

    /// Syscall argument, repeatable up to six times, in order.
    #[arg(short, long = "arg", value_name = "WORD", allow_negative_numbers = true)]
    args: Vec<i64>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    START_TIME.get_or_init(Instant::now);

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format(|buf, record| {
            let elapsed = START_TIME.get().unwrap().elapsed();
            writeln!(
                buf,
                "[{:5}.{:06}] {} {}",
                elapsed.as_secs(),
                elapsed.subsec_micros(),
                record.level(),
                record.args()
            )
        })
        .init();

    ptrace::attach(args.pid)?;
    info!("attached to pid {}", args.pid);

    let outcome = run_calls(&args);

    // Whatever happened, try to leave the tracee running free again.
    match ptrace::detach(args.pid) {
        Ok(()) => debug!("detached from pid {}", args.pid),
        Err(err) => warn!("detach from pid {} failed: {}", args.pid, err),
    }
    outcome
}

fn run_calls(args: &Args) -> anyhow::Result<()> {
    let mut tracee = Tracee::new(PtraceTarget::new(args.pid));
    let mut seq = tracee.sequence()?;

    let reported = seq.getpid()?;
    if reported == args.pid as isize {
        info!("tracee answers getpid as {reported}");
    } else {
        warn!(
            "tracee answers getpid as {reported}, expected {}; pid namespaces differ?",
            args.pid
        );
    }

    if let Some(nr) = args.nr {
        let words: Vec<usize> = args.args.iter().map(|&arg| arg as usize).collect();
        let ret = seq.syscall(nr as libc::c_long, &words)?;
        info!("syscall {nr} returned {ret} ({ret:#x})");
        println!("{ret}");
    }
    Ok(())
}

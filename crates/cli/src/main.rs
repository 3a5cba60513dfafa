//! Run-driver CLI.
//!
//! This binary provides a single entry point for driven runs. It performs:
//! 1. **Run:** Builds the system from a JSON config and flags, then drives the
//!    synthetic engine through warmup and the main phase, exiting with the
//!    engine's exit code.
//! 2. **Describe:** Prints the system that would be built (cluster, caches, boot command line).
//! 3. **FDP:** Runs the fetch-directed prefetch experiment, or its baseline.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use simdrive_core::common::Result;
use simdrive_core::config::{RunConfig, SimConfig};
use simdrive_core::fdp::{FdpExperiment, FdpWorkload, Isa};
use simdrive_core::sim::{SimulationDriver, SyntheticEngine, Workload};
use simdrive_core::topology::{CacheSpec, ClusterSpec, CpuModel, validate_ppi};

#[derive(Parser, Debug)]
#[command(
    name = "simdrive",
    author,
    version,
    about = "Warmup-aware full-system run driver",
    long_about = "Drive a simulation through an optional warmup phase and a main phase.\n\nWarmup statistics land in stats_warmup.txt, the main run in stats_final.txt, and checkpoints in cpt.<tick>.\n\nExamples:\n  simdrive run --cpu o3 --warmup-insts 5000000 --maxinsts 10000000\n  simdrive run --config run.json --checkpoint-at 1000000000\n  simdrive describe --cpu hpi --num-cores 4\n  simdrive fdp --isa Arm --disable-fdp"
)]
struct Cli {
    /// Log filter (e.g. `info`, `simdrive_core=debug`); overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation through warmup and the main phase.
    Run {
        #[command(flatten)]
        system: SystemArgs,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        workload: WorkloadArgs,
    },

    /// Print the system that would be built, without running it.
    Describe {
        #[command(flatten)]
        system: SystemArgs,
    },

    /// Run the fetch-directed prefetch experiment on a single O3 core.
    Fdp {
        /// The ISA to simulate.
        #[arg(long, default_value = "X86", value_parser = clap::value_parser!(Isa))]
        isa: Isa,

        /// The workload to simulate.
        #[arg(
            long = "workload",
            default_value = "hello",
            value_parser = clap::value_parser!(FdpWorkload)
        )]
        program: FdpWorkload,

        /// Disable FDP to evaluate the baseline.
        #[arg(long)]
        disable_fdp: bool,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        workload: WorkloadArgs,
    },
}

/// System topology flags; each overrides the JSON config when given.
#[derive(Args, Debug)]
struct SystemArgs {
    /// JSON configuration file loaded before flags are applied.
    #[arg(long)]
    config: Option<PathBuf>,

    /// CPU model to use.
    #[arg(long, value_parser = clap::value_parser!(CpuModel))]
    cpu: Option<CpuModel>,

    /// Number of CPU cores.
    #[arg(long)]
    num_cores: Option<usize>,

    /// Core clock (e.g. 4GHz).
    #[arg(long)]
    cpu_freq: Option<String>,

    /// Physical memory size (e.g. 512MB).
    #[arg(long)]
    mem_size: Option<String>,

    /// Linux kernel.
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Disk to instantiate.
    #[arg(long)]
    disk_image: Option<PathBuf>,

    /// OS device name for the root partition.
    #[arg(long)]
    root_device: Option<String>,

    /// DTB file to load (generated into the output directory when unset).
    #[arg(long)]
    dtb: Option<PathBuf>,

    /// initrd/initramfs file to load.
    #[arg(long)]
    initrd: Option<PathBuf>,

    /// Linux bootscript.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Add a PMU to each core in the cluster.
    #[arg(long)]
    with_pmu: bool,

    /// PPI connecting each PMU to its core (16..=31).
    #[arg(long, value_parser = parse_ppi)]
    pmu_ppi_number: Option<u32>,

    /// L1I replacement policy.
    #[arg(long)]
    l1i_rp_type: Option<String>,

    /// L1D replacement policy.
    #[arg(long)]
    l1d_rp_type: Option<String>,

    /// L2 replacement policy.
    #[arg(long)]
    l2_rp_type: Option<String>,

    /// L1I hardware prefetcher.
    #[arg(long)]
    l1i_hwp_type: Option<String>,

    /// L1D hardware prefetcher.
    #[arg(long)]
    l1d_hwp_type: Option<String>,

    /// L2 hardware prefetcher.
    #[arg(long)]
    l2_hwp_type: Option<String>,

    /// Preserved L2 ways for the EMISSARY replacement policy.
    #[arg(long)]
    preserve_ways: Option<u32>,

    /// Starvation randomness for EMISSARY cores [default: 100].
    #[arg(long)]
    starve_randomness: Option<f64>,
}

/// Run-control flags.
#[derive(Args, Debug)]
struct RunArgs {
    /// Output directory for stats files and checkpoints.
    #[arg(long, short = 'd')]
    outdir: Option<PathBuf>,

    /// Instructions to simulate before statistics are kept.
    #[arg(long)]
    warmup_insts: Option<u64>,

    /// Instructions to simulate after warmup.
    #[arg(long)]
    maxinsts: Option<u64>,

    /// Report the checkpoint directory at start-up.
    #[arg(long)]
    checkpoint: bool,

    /// Checkpoint directory to restore from.
    #[arg(long)]
    restore: Option<PathBuf>,
}

/// Synthetic workload flags.
#[derive(Args, Debug)]
struct WorkloadArgs {
    /// Instructions per core before the workload exits.
    #[arg(long, default_value_t = 100_000_000)]
    workload_insts: u64,

    /// Exit code reported by the workload.
    #[arg(long, default_value_t = 0)]
    exit_code: i32,

    /// Ticks at which the workload requests a checkpoint.
    #[arg(long, value_delimiter = ',')]
    checkpoint_at: Vec<u64>,
}

/// Starvation randomness used when neither a flag nor the config sets one.
const DEFAULT_STARVE_RANDOMNESS: f64 = 100.0;

fn parse_ppi(s: &str) -> std::result::Result<u32, String> {
    let n: u32 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    validate_ppi(n).map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Run {
            system,
            run,
            workload,
        } => cmd_run(&system, run, &workload),
        Commands::Describe { system } => cmd_describe(&system).map(|()| 0),
        Commands::Fdp {
            isa,
            program,
            disable_fdp,
            run,
            workload,
        } => {
            let mut experiment = FdpExperiment::new(isa);
            experiment.workload = program;
            if disable_fdp {
                experiment = experiment.baseline();
            }
            cmd_fdp(&experiment, run, &workload)
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %e, "simdrive failed");
            process::exit(1);
        }
    }
}

fn init_logging(level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

/// Loads the JSON config (if any) and applies system flags on top.
fn load_config(args: &SystemArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    let sys = &mut config.system;
    if let Some(cpu) = args.cpu {
        sys.cpu = cpu;
    }
    if let Some(n) = args.num_cores {
        sys.num_cores = n;
    }
    override_with(&mut sys.cpu_freq, args.cpu_freq.as_ref());
    override_with(&mut sys.mem_size, args.mem_size.as_ref());
    override_with(&mut sys.boot.kernel, args.kernel.as_ref());
    override_with(&mut sys.boot.disk_image, args.disk_image.as_ref());
    override_with(&mut sys.boot.root_device, args.root_device.as_ref());
    if args.dtb.is_some() {
        sys.boot.dtb.clone_from(&args.dtb);
    }
    if args.initrd.is_some() {
        sys.boot.initrd.clone_from(&args.initrd);
    }
    if args.script.is_some() {
        sys.boot.script.clone_from(&args.script);
    }
    sys.with_pmu |= args.with_pmu;
    if let Some(ppi) = args.pmu_ppi_number {
        sys.pmu_ppi_number = ppi;
    }

    let caches = &mut sys.caches;
    for (slot, flag) in [
        (&mut caches.l1i_rp, &args.l1i_rp_type),
        (&mut caches.l1d_rp, &args.l1d_rp_type),
        (&mut caches.l2_rp, &args.l2_rp_type),
        (&mut caches.l1i_hwp, &args.l1i_hwp_type),
        (&mut caches.l1d_hwp, &args.l1d_hwp_type),
        (&mut caches.l2_hwp, &args.l2_hwp_type),
    ] {
        if flag.is_some() {
            slot.clone_from(flag);
        }
    }
    if args.preserve_ways.is_some() {
        caches.preserve_ways = args.preserve_ways;
    }
    caches.starve_randomness = args
        .starve_randomness
        .or(caches.starve_randomness)
        .or(Some(DEFAULT_STARVE_RANDOMNESS));

    config.validate()?;
    Ok(config)
}

fn override_with<T: Clone>(slot: &mut T, flag: Option<&T>) {
    if let Some(value) = flag {
        slot.clone_from(value);
    }
}

fn apply_run_args(r: &mut RunConfig, run: RunArgs) {
    if let Some(outdir) = run.outdir {
        r.outdir = outdir;
    }
    if run.warmup_insts.is_some() {
        r.warmup_insts = run.warmup_insts;
    }
    if run.maxinsts.is_some() {
        r.max_insts = run.maxinsts;
    }
    r.checkpoint |= run.checkpoint;
    if run.restore.is_some() {
        r.restore = run.restore;
    }
}

fn synthetic_workload(args: &WorkloadArgs) -> Workload {
    Workload::new(args.workload_insts)
        .with_exit_code(args.exit_code)
        .with_checkpoints(args.checkpoint_at.iter().copied())
}

/// Builds the system, drives the synthetic engine and returns the exit code.
fn cmd_run(system: &SystemArgs, run: RunArgs, workload: &WorkloadArgs) -> Result<i32> {
    let mut config = load_config(system)?;
    apply_run_args(&mut config.run, run);
    config.validate()?;
    config.system.boot.check_script()?;

    let cluster = config.system.build_cluster(&config.run)?;
    info!(
        cpu = %cluster.model,
        cores = cluster.len(),
        caches = cluster.l1i.is_some(),
        "system built"
    );

    let engine = SyntheticEngine::new(&cluster, synthetic_workload(workload));
    let stats = engine.stats_sink(&config.run.outdir);

    let mut driver = SimulationDriver::new(config.run, engine, stats);
    let outcome = driver.run()?;
    info!(
        cause = %outcome.event.cause,
        tick = outcome.tick,
        checkpoints = outcome.checkpoints.len(),
        code = outcome.exit_code(),
        "run finished"
    );
    Ok(outcome.exit_code())
}

/// Builds the FDP system, prints it and drives the synthetic engine over it.
fn cmd_fdp(experiment: &FdpExperiment, run: RunArgs, workload: &WorkloadArgs) -> Result<i32> {
    let mut config = RunConfig::default();
    apply_run_args(&mut config, run);
    let system = experiment.build(&config)?;

    println!("{}", experiment.banner());
    let fe = &system.front_end;
    println!(
        "  Front end: decoupled={} fetch buffer {}B, fetch target {}B, min inst {}B",
        fe.decoupled, fe.fetch_buffer_size, fe.fetch_target_width, fe.min_inst_size
    );
    let bp = &system.branch_predictor;
    println!(
        "  Branch predictor: {} BTB {}x{}-way shift {}",
        bp.kind, bp.btb_entries, bp.btb_assoc, bp.inst_shift_amt
    );
    println!("  L1I prefetchers: {}", system.l1i_prefetchers.join(" + "));
    println!("  Memory: {} {}", system.memory, system.memory_size);
    println!("  Binary: {}", system.workload_resource());

    let engine = SyntheticEngine::new(&system.cluster, synthetic_workload(workload));
    let stats = engine.stats_sink(&config.outdir);
    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run()?;
    println!(
        "Exiting @ tick {} because {}.",
        outcome.tick, outcome.event.cause
    );
    Ok(outcome.exit_code())
}

fn cmd_describe(system: &SystemArgs) -> Result<()> {
    let config = load_config(system)?;
    let spec = &config.system;
    let cluster = spec.build_cluster(&config.run)?;

    println!("CPU: {} x{} @ {}", cluster.model, cluster.len(), spec.cpu_freq);
    println!("  Clock period: {} ticks  Voltage: {}", cluster.clock_ticks, cluster.voltage);
    print_cache("L1I", cluster.l1i.as_ref());
    print_cache("L1D", cluster.l1d.as_ref());
    print_cache("L2", cluster.l2.as_ref());
    print_cache("L3", spec.l3().as_ref());
    print_cache("Walker", cluster.walker.as_ref());
    print_pmu(&cluster);

    let dtb = spec.boot.dtb_path(&config.run.outdir);
    println!("Kernel: {}", spec.boot.kernel.display());
    println!("  Disk: {}", spec.boot.disk_image.display());
    println!("  DTB: {}", dtb.display());
    if let Some(initrd) = &spec.boot.initrd {
        println!("  initrd: {}", initrd.display());
    }
    println!("  Command line: {}", spec.boot.kernel_command_line(&spec.mem_size));
    Ok(())
}

fn print_cache(label: &str, cache: Option<&CacheSpec>) {
    let Some(c) = cache else {
        println!("{label}: none");
        return;
    };
    println!(
        "{label}: {} KiB, {}-way, hit {} cycles, {} MSHRs{}{}",
        c.size_bytes / 1024,
        c.assoc,
        c.hit_latency(),
        c.mshrs,
        c.replacement_policy
            .as_deref()
            .map(|rp| format!(", rp={rp}"))
            .unwrap_or_default(),
        c.prefetcher
            .as_deref()
            .map(|pf| format!(", hwp={pf}"))
            .unwrap_or_default(),
    );
}

fn print_pmu(cluster: &ClusterSpec) {
    let ppis: Vec<String> = cluster
        .cores
        .iter()
        .filter_map(|c| c.pmu_ppi.map(|p| format!("cpu{}:{p}", c.id)))
        .collect();
    if !ppis.is_empty() {
        println!("PMU: {}", ppis.join(" "));
    }
}

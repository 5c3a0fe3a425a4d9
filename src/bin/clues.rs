use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use std::io::Write;
use std::path::PathBuf;

use clues_rs::evidence::{AncientSamples, LocusData, Realizations};
use clues_rs::io::ancient::read_ancient;
use clues_rs::io::coal::read_coal;
use clues_rs::io::text::read_time_bins;
use clues_rs::io::timeb::read_locus;
use clues_rs::model::{EpochGrid, FreqGrid};
use clues_rs::opt::{NelderMeadConfig, SelectionObjective, fit_selection};
use clues_rs::report::{
    InferenceSummary, OutputPaths, bin_estimates, write_freqs, write_inference, write_matrix_csv,
    write_summary,
};
use clues_rs::{NormalTables, SelectionModel};

#[derive(Parser, Debug)]
#[command(name = "clues")]
#[command(about = "Infer selection from allele genealogies and ancient genotype likelihoods", long_about = None)]
struct Cli {
    /// Prefix of the `<PREFIX>.timeb` genealogy file.
    #[arg(long)]
    times: Option<PathBuf>,
    /// Ancient samples: `time logL(AA) logL(AD) logL(DD)` or `time logL(A) logL(D)` rows.
    #[arg(long)]
    ancient_samps: Option<PathBuf>,
    /// Output prefix.
    #[arg(long)]
    out: PathBuf,
    /// Present-day derived allele frequency, if known.
    #[arg(long)]
    pop_freq: Option<f64>,
    /// Constant diploid effective population size.
    #[arg(short = 'N', long = "ne", default_value_t = 1e4)]
    ne: f64,
    /// Relate `.coal` population history; overrides --ne.
    #[arg(long)]
    coal: Option<PathBuf>,
    #[arg(long, default_value_t = 1000.0)]
    t_cutoff: f64,
    /// Whitespace-separated selection time-bin breakpoints.
    #[arg(long)]
    time_bins: Option<PathBuf>,
    #[arg(long, default_value_t = 0.1)]
    s_max: f64,
    /// Number of frequency bins.
    #[arg(long, default_value_t = 400)]
    df: usize,
    #[arg(long)]
    z_bins: Option<PathBuf>,
    #[arg(long)]
    z_logcdf: Option<PathBuf>,
    #[arg(long)]
    z_logsf: Option<PathBuf>,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long)]
    no_progress: bool,
    /// Suppress warnings.
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,
    /// Verbosity; repeat for more.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logger(cli: &Cli) {
    let level = if cli.quiet {
        log::LevelFilter::Off
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    if let Err(e) = env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let level = record.level().as_str().to_lowercase();
            writeln!(buf, "[clues {level:>5}] {}", record.args())
        })
        .try_init()
    {
        eprintln!("failed to setup logger: {e}");
    }
}

fn load_realizations(cli: &Cli) -> Result<Realizations> {
    let Some(prefix) = &cli.times else {
        return Ok(Realizations::NoEvidence);
    };
    let mut path = prefix.as_os_str().to_owned();
    path.push(".timeb");
    let path = PathBuf::from(path);
    let rec = read_locus(&path)?;
    log::info!(
        "locus bp={} {}>{}: {} derived of {} sampled, {} genealogies",
        rec.bp,
        rec.ancestral_allele as char,
        rec.derived_allele as char,
        rec.daf,
        rec.n,
        rec.draws.len()
    );
    Ok(rec.into_realizations())
}

fn load_ancient(cli: &Cli) -> Result<AncientSamples> {
    match &cli.ancient_samps {
        Some(path) => read_ancient(path),
        None => Ok(AncientSamples::default()),
    }
}

fn load_tables(cli: &Cli) -> Result<NormalTables> {
    match (&cli.z_bins, &cli.z_logcdf, &cli.z_logsf) {
        (Some(b), Some(c), Some(s)) => NormalTables::from_files(b, c, s),
        (None, None, None) => Ok(NormalTables::standard()),
        _ => bail!("--z-bins, --z-logcdf and --z-logsf must be given together"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli);
    if let Some(n_threads) = cli.threads {
        if n_threads == 0 {
            bail!("--threads must be >= 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| anyhow!("failed to configure Rayon global thread pool: {e}"))?;
    }
    if cli.times.is_none() && cli.ancient_samps.is_none() {
        bail!("supply coalescence times (--times) and/or ancient samples (--ancient-samps)");
    }

    let realizations = load_realizations(&cli)?;
    let ancient = load_ancient(&cli)?;
    let data = LocusData::new(realizations, ancient)?;

    let t_cutoff = if data.has_coalescences() {
        cli.t_cutoff
    } else {
        data.ancient
            .latest_time()
            .map(|t| t + 1.0)
            .context("ancient samples file has no rows")?
    };
    let epochs = EpochGrid::generations(t_cutoff)?;

    let pop_sizes = match &cli.coal {
        Some(path) => read_coal(path)?.per_row(&epochs),
        None => vec![cli.ne; epochs.n_rows()],
    };
    let freqs = FreqGrid::uniform(cli.df, pop_sizes[0])?;
    let time_bins = match &cli.time_bins {
        Some(path) => read_time_bins(path)?,
        None => vec![0.0, t_cutoff],
    };
    let tables = load_tables(&cli)?;

    let model = SelectionModel::new(freqs, epochs, pop_sizes, time_bins, cli.s_max, cli.pop_freq)?;
    log::info!(
        "{} frequency bins, {} epochs, {} selection bins, {} ancient samples",
        model.n_freqs(),
        model.n_rows(),
        model.n_free_params(),
        data.ancient.len()
    );

    let objective = SelectionObjective::new(&model, &data, &tables);
    let config = NelderMeadConfig {
        progress: !cli.no_progress,
        ..NelderMeadConfig::default()
    };
    let fit = fit_selection(&objective, &config)?;
    log::info!("logLR = {:.4}, s = {:?}", fit.loglr, fit.s_hat);

    let paths = OutputPaths::from_prefix(&cli.out);
    write_inference(&paths.inference, &fit, &model.time_bins)?;
    write_matrix_csv(&paths.posterior, &fit.posterior)?;
    write_freqs(&paths.freqs, model.freqs.values())?;
    write_summary(
        &paths.summary,
        &InferenceSummary {
            loglr: fit.loglr,
            neg_loglike: fit.neg_loglike,
            neutral_neg_loglike: fit.neutral_neg_loglike,
            bins: bin_estimates(&model.time_bins, &fit.s_hat),
            n_realizations: data.realizations.len(),
            n_ancient: data.ancient.len(),
            n_freqs: model.n_freqs(),
            n_epochs: model.n_rows(),
            t_cutoff,
            s_max: model.s_max,
            n_iter: fit.n_iter,
            n_fev: fit.n_fev,
            converged: fit.converged,
        },
    )?;

    println!("logLR: {:.4}", fit.loglr);
    println!("Results: {}", paths.inference.display());
    Ok(())
}

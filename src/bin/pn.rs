use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;

use pn_analyzer::config::AnalysisConfig;
use pn_analyzer::engine::AnalysisEngine;
use pn_analyzer::net::io::{read_net, write_net};
use pn_analyzer::net::Net;
use pn_analyzer::options::{Mode, Options};
use pn_analyzer::report::AnalysisReport;

const DEFAULT_CONFIG: &str = "pn.toml";

/// 六库所环：每个迁移把唯一的 token 传给下一个库所。
fn example_net() -> Result<Net> {
    let n = 6;
    let mut f = vec![vec![0; n]; n];
    let mut h = vec![vec![0; n]; n];
    for i in 0..n {
        f[i][i] = 1;
        h[i][(i + 1) % n] = 1;
    }
    let mut m0 = vec![0; n];
    m0[0] = 1;
    Ok(Net::from_matrices(&f, &h, &m0)?)
}

fn parse_options() -> Result<Options> {
    let env_flags = std::env::var("PN_FLAGS").unwrap_or_default();
    let from_env = Options::parse_from_str(&env_flags).map_err(|e| anyhow!("invalid PN_FLAGS: {e}"))?;
    log::debug!("PN options from environment: {:?}", from_env);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let from_cli = match Options::parse_from_args(&args) {
        Ok(options) => options,
        Err(err) => match err.downcast_ref::<clap::Error>() {
            // --help / --version / usage errors print themselves
            Some(clap_err) => clap_err.exit(),
            None => return Err(anyhow!("{err}")),
        },
    };
    Ok(from_cli.or(from_env))
}

fn run() -> Result<()> {
    let options = parse_options()?;

    let mut config = match &options.config {
        Some(path) => {
            anyhow::ensure!(path.exists(), "config file {:?} does not exist", path);
            AnalysisConfig::load_from_file(path)?
        }
        None => AnalysisConfig::load_from_file(Path::new(DEFAULT_CONFIG))?,
    };
    options.apply(&mut config);
    config.validate()?;
    log::debug!("analysis config: {:?}", config);

    let net = if options.example {
        example_net()?
    } else {
        let path = options
            .file
            .as_ref()
            .ok_or_else(|| anyhow!("no input net given; pass FILE or --example"))?;
        read_net(path).with_context(|| format!("Failed to load net from {:?}", path))?
    };

    let engine = AnalysisEngine::new(net, config);
    let report = match options.mode() {
        Mode::All => engine.analyze(),
        mode => {
            let start = Instant::now();
            engine.net().log_diagnostics();
            let mut report = AnalysisReport::new(engine.net());
            if mode == Mode::Simulate {
                let mut rng = match options.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                let steps = engine.config().simulation_steps;
                report.set_simulation(engine.simulate(steps, &mut rng)?);
            }
            if mode.runs_invariants() {
                report.set_invariants(engine.analyze_invariants());
            }
            if mode.runs_coverability() {
                let graph = engine.build_coverability_graph();
                report.set_properties(engine.classify(&graph));
                report.set_coverability(graph);
            }
            report.analysis_time = start.elapsed();
            report
        }
    };

    if let Some(path) = &options.dot {
        let graph = report
            .coverability
            .as_ref()
            .ok_or_else(|| anyhow!("--dot needs a coverability run (mode all or coverability)"))?;
        graph
            .write_dot(path)
            .with_context(|| format!("Failed to write coverability graph to {:?}", path))?;
        log::info!("coverability graph written to {:?}", path);
    }
    if let Some(path) = &options.net_dot {
        engine
            .net()
            .write_dot(path)
            .with_context(|| format!("Failed to write net to {:?}", path))?;
        log::info!("net written to {:?}", path);
    }
    if let Some(path) = &options.save_net {
        write_net(path, engine.net()).with_context(|| format!("Failed to write net to {:?}", path))?;
        log::info!("net layout written to {:?}", path);
    }
    if let Some(path) = &options.output {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
    }

    if options.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn main() {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

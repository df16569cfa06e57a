//! Parsing Options.
//! `pn <FILE> --mode {all|invariants|coverability|simulate}`; extra flags may
//! also come from the `PN_FLAGS` environment variable.

use clap::{Arg, ArgAction, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

use crate::config::AnalysisConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Mode {
    #[default]
    All,
    Invariants,
    Coverability,
    Simulate,
}

impl Mode {
    pub fn runs_invariants(self) -> bool {
        matches!(self, Mode::All | Mode::Invariants)
    }

    pub fn runs_coverability(self) -> bool {
        matches!(self, Mode::All | Mode::Coverability)
    }
}

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pn")
        .no_binary_name(true)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Structural invariants and coverability analysis of Petri nets")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Net in the `P T` / F / H / M0 text layout"),
        )
        .arg(
            Arg::new("example")
                .long("example")
                .action(ArgAction::SetTrue)
                .help("Analyse the built-in six-place cycle instead of FILE"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .help("Which analysis to run")
                .value_parser(["all", "invariants", "coverability", "simulate"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("TOML file with analysis settings"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to file where the report (and its .json twin) will be stored"),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write the coverability graph in DOT format"),
        )
        .arg(
            Arg::new("net-dot")
                .long("net-dot")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write the net itself in DOT format"),
        )
        .arg(
            Arg::new("save-net")
                .long("save-net")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write the loaded net back out in the text layout"),
        )
        .arg(
            Arg::new("steps")
                .long("steps")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of token-game rounds in simulate mode"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Random seed for simulate mode"),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Coverability step budget"),
        )
        .arg(
            Arg::new("epsilon")
                .long("epsilon")
                .value_name("X")
                .value_parser(value_parser!(f64))
                .help("Singular values at or below X span the null space"),
        );
    parser
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Options {
    pub file: Option<PathBuf>,
    pub example: bool,
    pub mode: Option<Mode>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub dot: Option<PathBuf>,
    pub net_dot: Option<PathBuf>,
    pub save_net: Option<PathBuf>,
    pub steps: Option<usize>,
    pub seed: Option<u64>,
    pub budget: Option<usize>,
    pub epsilon: Option<f64>,
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;
        let mode = match matches.get_one::<String>("mode").map(String::as_str) {
            None => None,
            Some("all") => Some(Mode::All),
            Some("invariants") => Some(Mode::Invariants),
            Some("coverability") => Some(Mode::Coverability),
            Some("simulate") => Some(Mode::Simulate),
            Some(other) => return Err(format!("unsupported mode `{other}`").into()),
        };

        Ok(Options {
            file: matches.get_one::<PathBuf>("file").cloned(),
            example: matches.get_flag("example"),
            mode,
            config: matches.get_one::<PathBuf>("config").cloned(),
            json: matches.get_flag("json"),
            output: matches.get_one::<PathBuf>("output").cloned(),
            dot: matches.get_one::<PathBuf>("dot").cloned(),
            net_dot: matches.get_one::<PathBuf>("net-dot").cloned(),
            save_net: matches.get_one::<PathBuf>("save-net").cloned(),
            steps: matches.get_one::<usize>("steps").copied(),
            seed: matches.get_one::<u64>("seed").copied(),
            budget: matches.get_one::<usize>("budget").copied(),
            epsilon: matches.get_one::<f64>("epsilon").copied(),
        })
    }

    /// Fills every option not given here from `fallback` (e.g. `PN_FLAGS`).
    pub fn or(self, fallback: Options) -> Options {
        Options {
            file: self.file.or(fallback.file),
            example: self.example || fallback.example,
            mode: self.mode.or(fallback.mode),
            config: self.config.or(fallback.config),
            json: self.json || fallback.json,
            output: self.output.or(fallback.output),
            dot: self.dot.or(fallback.dot),
            net_dot: self.net_dot.or(fallback.net_dot),
            save_net: self.save_net.or(fallback.save_net),
            steps: self.steps.or(fallback.steps),
            seed: self.seed.or(fallback.seed),
            budget: self.budget.or(fallback.budget),
            epsilon: self.epsilon.or(fallback.epsilon),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    /// Command-line overrides on top of the configuration file.
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(budget) = self.budget {
            config.step_budget = budget;
        }
        if let Some(epsilon) = self.epsilon {
            config.null_space_epsilon = epsilon;
        }
        if let Some(steps) = self.steps {
            config.simulation_steps = steps;
        }
    }
}

use clap::Parser;
use cut_optimizer::cancel::CancelToken;
use cut_optimizer::config::{DEFAULT_KERF, OptimizerConfig, Strategy};
use cut_optimizer::parse::parse_length;
use cut_optimizer::render;
use cut_optimizer::report::{self, PlanReport, pretty_len, to_fraction};
use cut_optimizer::solver::Solver;
use cut_optimizer::types::{Demand, SolutionStatus};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "cut_optimizer",
    about = "1D cutting stock optimizer for tube, bar and lumber"
)]
struct Cli {
    /// Stock length (e.g. 288, 24', 20' 6")
    #[arg(long, value_parser = parse_positive_length)]
    stock: f64,

    /// Cuts as LEN:QTY (e.g. 100:2 "7'6 1/2\":4")
    #[arg(long = "cuts", num_args = 1..)]
    cuts: Vec<String>,

    /// Blade kerf (default: 1/8")
    #[arg(long)]
    kerf: Option<String>,

    /// Strategy: auto, mip, greedy, or branch-and-bound
    #[arg(long, default_value = "auto", value_parser = parse_strategy)]
    strategy: Strategy,

    /// Stop searching after this many seconds and keep the best plan
    #[arg(long)]
    time_limit: Option<f64>,

    /// Accepted relative MIP gap (at most 0.01)
    #[arg(long, default_value_t = 0.0)]
    gap: f64,

    /// Fall back to the greedy packer if the MIP solver fails
    #[arg(long)]
    fallback: bool,

    /// Material name shown in the summary
    #[arg(long)]
    material: Option<String>,

    /// Show ASCII layout of each stick
    #[arg(long)]
    layout: bool,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,

    /// Log solver progress to stderr
    #[arg(long)]
    verbose: bool,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

fn parse_positive_length(s: &str) -> Result<f64, String> {
    match parse_length(s) {
        Some(v) if v > 0.0 => Ok(v),
        Some(_) => Err(format!("length must be positive in '{}'", s)),
        None => Err(format!("invalid length '{}'", s)),
    }
}

fn parse_cut(s: &str) -> Result<Demand, String> {
    let (len, qty) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid cut '{}', expected LEN:QTY", s))?;
    let length = parse_positive_length(len)?;
    let qty = qty
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    if qty == 0 {
        return Err(format!("quantity must be non-zero in '{}'", s));
    }
    Ok(Demand::new(length, qty))
}

fn parse_kerf(s: Option<&str>) -> f64 {
    let Some(s) = s else {
        return DEFAULT_KERF;
    };
    match parse_length(s) {
        Some(k) if k >= 0.0 => k,
        _ => {
            eprintln!(
                "Warning: invalid kerf '{}', using {}",
                s,
                to_fraction(DEFAULT_KERF)
            );
            DEFAULT_KERF
        }
    }
}

/// Exit status after a second Ctrl+C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Handles the `presses`-th Ctrl+C. The first one cancels `token` so the
/// search returns its best plan so far; any later one asks for an exit.
fn on_interrupt(presses: u32, token: &CancelToken) -> bool {
    if presses <= 1 {
        eprintln!("Interrupted, keeping the best plan found so far (Ctrl+C again to abort)");
        token.cancel();
        false
    } else {
        eprintln!("Aborted");
        true
    }
}

fn cancel_on_ctrl_c(token: CancelToken) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "cannot install Ctrl+C handler");
                return;
            }
        };
        rt.block_on(async {
            let mut presses = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                presses += 1;
                if on_interrupt(presses, &token) {
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
    });
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_max_level(Level::DEBUG)
            .init();
    }

    let demands: Vec<Demand> = cli
        .cuts
        .iter()
        .map(|c| parse_cut(c))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let kerf = parse_kerf(cli.kerf.as_deref());

    let mut config = OptimizerConfig::default()
        .with_strategy(cli.strategy)
        .with_mip_rel_gap(cli.gap);
    if let Some(secs) = cli.time_limit {
        config = config.with_time_limit_ms((secs.max(0.0) * 1000.0) as u64);
    }
    config.fallback_to_greedy = cli.fallback;

    let token = CancelToken::new();
    cancel_on_ctrl_c(token.clone());

    let solver = Solver::new(cli.stock, kerf, demands).with_config(config);
    let solution = solver.solve_with_token(&token).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    if cli.json {
        match serde_json::to_string_pretty(&PlanReport::new(&solution)) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Output results
    for (i, stick) in solution.sticks.iter().enumerate() {
        println!("Stick {}:", i + 1);
        for cut in &stick.cuts {
            println!("  #{:<4} {}", cut.id, pretty_len(cut.length));
        }
        println!("  waste {}", pretty_len(stick.waste_length));
        if cli.layout {
            print!("{}", render::render_stick(stick, solution.stock_length, solution.kerf));
        }
        println!();
    }

    print!("{}", report::summary(&solution, cli.material.as_deref()));

    if solution.status == SolutionStatus::Cancelled {
        eprintln!("Search was stopped early; the plan may not be optimal");
    }
}

use anyhow::{bail, Context};
use clap::Parser;
use std::time::{Duration, Instant};

use etalon::{solve_lp, LpProblem, PricingStrategy, SolveMode, SolverEnv, Status};

fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.3}s")
    } else if secs >= 1e-3 {
        format!("{:.3}ms", secs * 1e3)
    } else {
        format!("{:.3}us", secs * 1e6)
    }
}

#[derive(Parser, Debug)]
#[command(
    about = "Solves a built-in sample LP with the simplex core and prints demo-style stats.",
    version
)]
struct Args {
    /// Sample problem: "production", "transport", or "unbounded".
    #[arg(long, default_value = "transport")]
    sample: String,

    /// Pricing strategy code: 0 auto, 1 partial, 2 steepest-edge, 3 devex.
    #[arg(long, default_value_t = 0)]
    pricing: i32,

    /// Solve mode: 0 primal, 1 dual.
    #[arg(long, default_value_t = 0)]
    mode: i32,

    /// Iteration limit.
    #[arg(long, default_value_t = 1000)]
    iteration_limit: usize,

    /// Pivots between refactorizations.
    #[arg(long, default_value_t = 50)]
    refactor_interval: usize,
}

/// min 3a + 2b  s.t.  a + b >= 2,  a <= 1.5,  b <= 1.5
fn production() -> anyhow::Result<LpProblem> {
    let mut b = LpProblem::builder(1, 2);
    b.objective(0, 3.0)?;
    b.objective(1, 2.0)?;
    b.coefficient(0, 0, 1.0)?;
    b.coefficient(0, 1, 1.0)?;
    b.bounds(0, 0.0, 1.5)?;
    b.bounds(1, 0.0, 1.5)?;
    b.row(0, '>', 2.0)?;
    Ok(b.finalize()?)
}

/// Two-source, three-sink transportation problem with optimum 130.
fn transport() -> anyhow::Result<LpProblem> {
    let supplies = [30.0, 20.0];
    let demands = [10.0, 25.0, 15.0];
    let costs = [[2.0, 3.0, 1.0], [5.0, 4.0, 8.0]];

    let mut b = LpProblem::builder(5, 6);
    for (i, row) in costs.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            let var = i * 3 + j;
            b.objective(var, c)?;
            // supply row i, demand row 2 + j
            b.coefficient(i, var, 1.0)?;
            b.coefficient(2 + j, var, 1.0)?;
        }
    }
    for (i, &s) in supplies.iter().enumerate() {
        b.row(i, '<', s)?;
    }
    for (j, &d) in demands.iter().enumerate() {
        b.row(2 + j, '>', d)?;
    }
    Ok(b.finalize()?)
}

/// min -x - y  s.t.  x - y <= 1,  x, y >= 0
fn unbounded() -> anyhow::Result<LpProblem> {
    let mut b = LpProblem::builder(1, 2);
    b.objective(0, -1.0)?;
    b.objective(1, -1.0)?;
    b.coefficient(0, 0, 1.0)?;
    b.coefficient(0, 1, -1.0)?;
    b.row(0, '<', 1.0)?;
    Ok(b.finalize()?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut problem = match args.sample.as_str() {
        "production" => production()?,
        "transport" => transport()?,
        "unbounded" => unbounded()?,
        other => bail!("unknown sample '{other}'"),
    };

    let mut env = SolverEnv::default();
    env.iteration_limit = args.iteration_limit;
    env.refactor_interval = args.refactor_interval;
    env.solve_mode = match args.mode {
        0 => SolveMode::Primal,
        1 => SolveMode::Dual,
        other => bail!("unsupported mode {other}"),
    };
    env.pricing = PricingStrategy::from_code(args.pricing).context("bad pricing strategy code")?;
    env.validate();

    println!("sample: {}", args.sample);
    println!(
        "dim: {} rows x {} structural columns, nnz {}",
        problem.num_rows(),
        problem.num_structural(),
        problem.nnz()
    );
    let csr = problem.matrix_mut().rows_view();
    println!("row view: valid={} nnz={}", csr.valid, csr.nnz());
    println!("pricing strategy: {:?}", env.pricing);

    let t = Instant::now();
    let solution = solve_lp(&problem, &env)?;
    let elapsed = t.elapsed();

    println!();
    println!("status: {:?} (code {})", solution.status, solution.status.code());
    println!("objective: {:.6}", solution.objective);
    println!("iterations: {}", solution.iterations);
    println!("x: {:.4}", solution.x);
    println!("duals: {:.4}", solution.duals);
    println!("solve time: {}", fmt_duration(elapsed));

    if solution.status == Status::Optimal {
        println!("basis: {:?}", solution.basis.variable_status);
    }
    Ok(())
}

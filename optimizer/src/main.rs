use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  let mode = optimizer::OptimizeMode::from_args(&args)?;
  optimizer::run(mode).context("optimizer run")
}

mod cli;

use anyhow::Result;
use box_cropper::{run, UslsDetector};
use cli::Args;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing on stderr; stdout carries the JSON results
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse_args();
    let options = args.to_options()?;

    let mut detector = UslsDetector::new(&args.model, args.load_class_names()?, options.backend())?;

    let results = run(&mut detector, &options)?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}

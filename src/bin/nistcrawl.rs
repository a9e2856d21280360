use anyhow::Result;
use clap::Parser;
use log::info;
use nistcrawl::report::{self, QueryResult};
use nistcrawl::{Cli, Resolver};
use std::fs;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let structures_dir = cli.out_dir.join("structures");
    fs::create_dir_all(&structures_dir)?;

    let rows = report::read_input(&cli.input)?;
    let mut resolver = Resolver::new(cli.build_controls(), structures_dir)?;

    let mut results = Vec::new();
    for row in rows {
        let mut species = resolver.by_formula(&row.formula).await?;
        if species.is_empty() {
            // The formula search only matches gross composition; fall back to
            // the original name.
            species = resolver.by_name(&row.name).await?;
        }
        if species.is_empty() {
            info!("no data found for {}", row.name);
            continue;
        }
        info!("found {} records for {}", species.len(), row.name);
        results.push(QueryResult {
            input: row,
            species,
        });
    }

    let csv_path = report::write_results_csv(&cli.out_dir.join("result.csv"), &results)?;
    println!("Results are written in {}.", csv_path.display());

    let json_path = report::write_results_json(&cli.out_dir.join("result.json"), &results)?;
    println!("Full results are written as json in {}.", json_path.display());

    let citations = resolver.drain_citations();
    let citations_path = report::write_citations(
        &cli.out_dir.join("citations.txt"),
        resolver.fetcher(),
        resolver.base(),
        &citations,
    )
    .await?;
    println!("Citations are written in {}.", citations_path.display());

    Ok(())
}

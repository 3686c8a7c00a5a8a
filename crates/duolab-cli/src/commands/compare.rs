use anyhow::Result;

use duolab_viz::{ComparisonConfig, ComparisonReport, run_comparison};

use crate::CompareArgs;

pub fn comparison_config(args: &CompareArgs) -> ComparisonConfig {
    ComparisonConfig {
        n_samples: args.samples,
        n_generated: args.samples,
        data_seed: args.seed,
        gmm_seed: args.gmm_seed,
        output: args.output.clone(),
        ..Default::default()
    }
}

pub fn success_message(report: &ComparisonReport) -> String {
    format!(
        "Success! Plot saved as '{}' in your current folder.",
        report.output.display()
    )
}

pub fn run(args: &CompareArgs) -> Result<ComparisonReport> {
    let report = run_comparison(&comparison_config(args))?;
    println!("{}", success_message(&report));
    Ok(report)
}

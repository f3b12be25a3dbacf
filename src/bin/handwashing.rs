use chrono::NaiveDate;
use clap::Parser;
use handwashing_analysis::{
    data_path, handwashing_start, header, load_monthly, load_yearly, report::Analysis,
    stats::{self, Field},
    Clinic,
};
use qu::ick_use::*;
use std::path::PathBuf;

/// Compare the proportion of deaths in the two clinics, and before and after handwashing.
#[derive(Debug, Parser)]
struct Opt {
    /// Deaths and births per year, for each clinic.
    #[clap(long, default_value_os_t = data_path("yearly_deaths_by_clinic.xlsx"))]
    yearly: PathBuf,
    /// Deaths and births per month, for clinic 1.
    #[clap(long, default_value_os_t = data_path("monthly_deaths.xlsx"))]
    monthly: PathBuf,
    /// The first day of handwashing (YYYY-MM-DD).
    #[clap(long, default_value_t = handwashing_start())]
    threshold: NaiveDate,
    /// Write SVG charts to this directory.
    #[clap(long)]
    charts: Option<PathBuf>,
    /// Write the numbers as JSON to this file.
    #[clap(long)]
    json: Option<PathBuf>,
    /// Display tables and charts in an evcxr notebook, rather than the terminal.
    #[clap(long)]
    evcxr: bool,
    /// Replace output files that already exist.
    #[clap(long, short)]
    overwrite: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let yearly = load_yearly(&opt.yearly).context("loading yearly deaths by clinic")?;
    let monthly = load_monthly(&opt.monthly).context("loading monthly deaths")?;
    let analysis = Analysis::new(&yearly, &monthly, opt.threshold);

    if opt.evcxr {
        analysis.yearly.evcxr_display();
        for clinic in Clinic::ALL {
            analysis.clinic(clinic).evcxr_display();
        }
        let (before, after) = analysis.before_after();
        before.evcxr_display();
        after.evcxr_display();
    } else {
        header("Yearly deaths by clinic");
        println!("{}", analysis.yearly);
        for clinic in Clinic::ALL {
            header(&format!("Yearly deaths in {}", clinic));
            println!("{}", analysis.clinic(clinic));
        }
        let (before, after) = analysis.before_after();
        header(&format!("Monthly deaths before {}", opt.threshold));
        println!("{}", before);
        header(&format!("Monthly deaths from {}", opt.threshold));
        println!("{}", after);
        println!(
            "mean births per month before: {:.1}, after: {:.1}",
            stats::mean(&before, Field::Births),
            stats::mean(&after, Field::Births)
        );
    }

    let report = analysis.report();
    let charts = analysis.charts();
    if opt.evcxr {
        report.evcxr_display();
        for chart in &charts {
            chart.evcxr_display();
        }
    } else {
        report.print_term_tables();
    }

    if let Some(dir) = &opt.charts {
        for chart in &charts {
            chart.save(dir, opt.overwrite)?;
        }
    }
    if let Some(path) = &opt.json {
        report.save_json(path, opt.overwrite)?;
    }
    Ok(())
}

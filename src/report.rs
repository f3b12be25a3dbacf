//! The whole handwashing analysis: derived tables, the numbers that come out of them, and charts.
use crate::{
    add_death_proportion,
    chart::{date_x, Chart, Color, Series},
    partition_by_clinic, partition_by_date,
    stats::{self, describe, CountField, Field, Summary},
    util::{self, header, path_exists},
    Clinic, MonthlyRecord, MonthlyTable, Partition, Proportioned, Records, YearlyRecord,
    YearlyTable,
};
use chrono::NaiveDate;
use qu::ick_use::*;
use serde::Serialize;
use std::{collections::BTreeMap, fs, path::Path};

/// Width of the yearly death bars, in years.
const BAR_WIDTH: f64 = 0.6;

/// The datasets with their proportion of deaths, ready to be partitioned and summarised.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub threshold: NaiveDate,
    pub yearly: Records<Proportioned<YearlyRecord>>,
    pub monthly: Records<Proportioned<MonthlyRecord>>,
}

impl Analysis {
    pub fn new(yearly: &YearlyTable, monthly: &MonthlyTable, threshold: NaiveDate) -> Self {
        Analysis {
            threshold,
            yearly: add_death_proportion(yearly),
            monthly: add_death_proportion(monthly),
        }
    }

    pub fn clinic(&self, clinic: Clinic) -> Partition<'_, Proportioned<YearlyRecord>> {
        partition_by_clinic(&self.yearly, clinic)
    }

    /// Monthly records before and after handwashing.
    pub fn before_after(
        &self,
    ) -> (
        Partition<'_, Proportioned<MonthlyRecord>>,
        Partition<'_, Proportioned<MonthlyRecord>>,
    ) {
        partition_by_date(&self.monthly, self.threshold)
    }

    pub fn report(&self) -> HandwashingReport {
        let (before, after) = self.before_after();
        let before_summary = describe(&before, Field::DeathProportion);
        let after_summary = describe(&after, Field::DeathProportion);
        if before.is_empty() || after.is_empty() {
            event!(
                Level::WARN,
                "no monthly records {} {}, the mean difference is undefined",
                if before.is_empty() { "before" } else { "from" },
                self.threshold
            );
        }
        HandwashingReport {
            threshold: self.threshold,
            deaths_by_clinic: stats::sum_by_clinic(&self.yearly, CountField::Deaths),
            births_by_clinic: stats::sum_by_clinic(&self.yearly, CountField::Births),
            yearly_proportions: YearProportions::from_table(&self.yearly),
            before: before_summary,
            after: after_summary,
            mean_difference: stats::mean_difference(&after, &before, Field::DeathProportion),
        }
    }

    /// Every chart of the analysis, in the order they are usually looked at.
    pub fn charts(&self) -> Vec<Chart> {
        let (before, after) = self.before_after();
        let clinic_1 = self.clinic(Clinic::One);
        let clinic_2 = self.clinic(Clinic::Two);
        vec![
            deaths_per_year(&clinic_1, Clinic::One, Color::RED),
            deaths_per_year(&clinic_2, Clinic::Two, Color::GREEN),
            Chart::new("Proportion of Deaths per Year")
                .with_labels("year", "Proportion of Deaths")
                .with_legend()
                .with_series(proportion_by_year("clinic_1", Color::RED, &clinic_1))
                .with_series(proportion_by_year("clinic_2", Color::GREEN, &clinic_2)),
            Chart::new("Before Handwashing")
                .with_labels("Date", "Proportion of Deaths")
                .with_dates()
                .with_series(proportion_by_date("", Color::ORANGE, &before)),
            Chart::new("After Handwashing")
                .with_labels("Date", "Proportion of Deaths")
                .with_dates()
                .with_series(proportion_by_date("", Color::PURPLE, &after)),
            Chart::new("Before and After Handwashing")
                .with_labels("date", "Proportion deaths")
                .with_dates()
                .with_legend()
                .with_series(proportion_by_date(
                    "Before Handwashing",
                    Color::ORANGE,
                    &before,
                ))
                .with_series(proportion_by_date(
                    "After Handwashing",
                    Color::PURPLE,
                    &after,
                )),
        ]
    }
}

fn deaths_per_year(
    rows: &Partition<'_, Proportioned<YearlyRecord>>,
    clinic: Clinic,
    color: Color,
) -> Chart {
    let title = match clinic {
        Clinic::One => "Clinic 1: Number of Deaths per Year",
        Clinic::Two => "Clinic 2: Number of Deaths per Year",
    };
    Chart::new(title)
        .with_labels("Year", "Number of Deaths")
        .with_series(Series::bar(
            clinic.label(),
            color,
            BAR_WIDTH,
            rows.iter().map(|row| (row.year as f64, row.deaths as f64)),
        ))
}

fn proportion_by_year(
    label: &'static str,
    color: Color,
    rows: &Partition<'_, Proportioned<YearlyRecord>>,
) -> Series {
    Series::line(
        label,
        color,
        rows.iter()
            .map(|row| (row.year as f64, row.death_proportion)),
    )
}

fn proportion_by_date(
    label: &'static str,
    color: Color,
    rows: &Partition<'_, Proportioned<MonthlyRecord>>,
) -> Series {
    Series::line(
        label,
        color,
        rows.iter()
            .map(|row| (date_x(row.date), row.death_proportion)),
    )
}

/// The proportion of deaths in each clinic for one year. NaN where a clinic has no record, or
/// no births.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct YearProportions {
    pub year: i32,
    pub clinic_1: f64,
    pub clinic_2: f64,
}

impl YearProportions {
    fn from_table(table: &Records<Proportioned<YearlyRecord>>) -> Vec<Self> {
        // B Tree so years come out in order.
        let mut years: BTreeMap<i32, YearProportions> = BTreeMap::new();
        for row in table {
            let entry = years.entry(row.year).or_insert(YearProportions {
                year: row.year,
                clinic_1: f64::NAN,
                clinic_2: f64::NAN,
            });
            match row.clinic {
                Clinic::One => entry.clinic_1 = row.death_proportion,
                Clinic::Two => entry.clinic_2 = row.death_proportion,
            }
        }
        years.into_values().collect()
    }
}

/// All the numbers from one run of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandwashingReport {
    pub threshold: NaiveDate,
    pub deaths_by_clinic: BTreeMap<Clinic, u64>,
    pub births_by_clinic: BTreeMap<Clinic, u64>,
    pub yearly_proportions: Vec<YearProportions>,
    /// Monthly proportion of deaths before `threshold`.
    pub before: Summary,
    /// Monthly proportion of deaths from `threshold` on.
    pub after: Summary,
    /// Mean proportion after minus mean proportion before.
    pub mean_difference: f64,
}

impl HandwashingReport {
    fn clinic_rows(&self) -> Vec<Vec<String>> {
        Clinic::ALL
            .iter()
            .map(|clinic| {
                vec![
                    clinic.to_string(),
                    self.births_by_clinic
                        .get(clinic)
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                    self.deaths_by_clinic
                        .get(clinic)
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                ]
            })
            .collect()
    }

    fn proportion_rows(&self) -> Vec<Vec<String>> {
        self.yearly_proportions
            .iter()
            .map(|year| {
                vec![
                    year.year.to_string(),
                    format!("{:.6}", year.clinic_1),
                    format!("{:.6}", year.clinic_2),
                ]
            })
            .collect()
    }

    fn handwashing_rows(&self) -> Vec<Vec<String>> {
        let stat = |label: &str, get: fn(&Summary) -> String| {
            vec![label.to_string(), get(&self.before), get(&self.after)]
        };
        vec![
            stat("months", |s| s.count.to_string()),
            stat("months with no births", |s| s.undefined.to_string()),
            stat("mean proportion of deaths", |s| format!("{:.6}", s.mean)),
            stat("standard deviation", |s| format!("{:.6}", s.std_dev)),
            stat("lowest", |s| format!("{:.6}", s.min)),
            stat("highest", |s| format!("{:.6}", s.max)),
        ]
    }

    fn sections(&self) -> [(&'static str, Vec<&'static str>, Vec<Vec<String>>); 3] {
        [
            (
                "Births and deaths by clinic, all years",
                vec!["clinic", "births", "deaths"],
                self.clinic_rows(),
            ),
            (
                "Proportion of deaths per year",
                vec!["year", "clinic 1", "clinic 2"],
                self.proportion_rows(),
            ),
            (
                "Monthly proportion of deaths",
                vec!["", "before handwashing", "after handwashing"],
                self.handwashing_rows(),
            ),
        ]
    }

    fn difference_line(&self) -> String {
        format!(
            "mean difference (after - before {}): {:.6}",
            self.threshold, self.mean_difference
        )
    }

    pub fn print_term_tables(&self) {
        for (title, headers, rows) in self.sections() {
            header(title);
            println!("{}", util::term_table(&headers, rows, 0, false));
        }
        println!("{}", self.difference_line());
    }

    pub fn evcxr_display(&self) {
        let mut html = String::new();
        for (title, headers, rows) in self.sections() {
            html.push_str(&util::html_table(Some(title), &headers, rows, 0, false));
        }
        html.push_str("<p>");
        html_escape::encode_text_to_string(self.difference_line(), &mut html);
        html.push_str("</p>");
        util::evcxr_display("text/html", &html);
    }

    /// Save the report as JSON. Undefined values are written as `null`.
    pub fn save_json(&self, path: impl AsRef<Path>, overwrite: bool) -> Result {
        fn inner(this: &HandwashingReport, path: &Path, overwrite: bool) -> Result {
            ensure!(overwrite || !path_exists(path)?, "file already exists");
            let text = serde_json::to_string_pretty(this).context("serializing report")?;
            fs::write(path, text)?;
            Ok(())
        }

        let path = path.as_ref();
        inner(self, path, overwrite)
            .with_context(|| format!("error writing report to file \"{}\"", path.display()))?;
        event!(Level::INFO, "wrote report \"{}\"", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{handwashing_start, load_monthly, load_yearly};
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data/test")
            .join(name)
    }

    fn analysis() -> Analysis {
        let yearly = load_yearly(fixture("yearly_deaths_by_clinic.xlsx")).unwrap();
        let monthly = load_monthly(fixture("monthly_deaths.xlsx")).unwrap();
        Analysis::new(&yearly, &monthly, handwashing_start())
    }

    #[test]
    fn report_numbers() {
        let report = analysis().report();
        assert_eq!(report.deaths_by_clinic[&Clinic::One], 1989);
        assert_eq!(report.deaths_by_clinic[&Clinic::Two], 691);
        assert_eq!(report.births_by_clinic[&Clinic::One], 20042);
        assert_eq!(report.births_by_clinic[&Clinic::Two], 17791);

        assert_eq!(report.yearly_proportions.len(), 6);
        let first = report.yearly_proportions[0];
        assert_eq!(first.year, 1841);
        assert!((first.clinic_1 - 0.0781).abs() < 1e-4);
        assert!((first.clinic_2 - 0.0352).abs() < 1e-4);

        assert_eq!(report.before.count, 5);
        assert_eq!(report.after.count, 3);
        assert!(report.before.mean > report.after.mean);
        assert!(report.mean_difference < 0.);
        assert!(
            (report.mean_difference - (report.after.mean - report.before.mean)).abs() < 1e-12
        );
    }

    #[test]
    fn clinic_1_was_deadlier() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/yearly_deaths_by_clinic.xlsx");
        let yearly = load_yearly(path).unwrap();
        assert_eq!(yearly.len(), 12);
        let monthly: MonthlyTable = Vec::new().into();
        let analysis = Analysis::new(&yearly, &monthly, handwashing_start());
        let clinic_1 = stats::mean(&analysis.clinic(Clinic::One), Field::DeathProportion);
        let clinic_2 = stats::mean(&analysis.clinic(Clinic::Two), Field::DeathProportion);
        assert!((clinic_1 - 0.0985).abs() < 1e-4);
        assert!((clinic_2 - 0.0404).abs() < 1e-4);

        let report = analysis.report();
        let worst = report
            .yearly_proportions
            .iter()
            .max_by(|a, b| a.clinic_1.total_cmp(&b.clinic_1))
            .unwrap();
        assert_eq!(worst.year, 1842);
        assert!(report
            .yearly_proportions
            .iter()
            .all(|year| year.clinic_1 > year.clinic_2));
    }

    #[test]
    fn missing_years_are_undefined() {
        let yearly: YearlyTable = vec![
            YearlyRecord {
                clinic: Clinic::One,
                year: 1841,
                births: 3036,
                deaths: 237,
            },
            YearlyRecord {
                clinic: Clinic::Two,
                year: 1842,
                births: 2659,
                deaths: 202,
            },
        ]
        .into();
        let proportions = YearProportions::from_table(&add_death_proportion(&yearly));
        assert_eq!(proportions.len(), 2);
        assert!(proportions[0].clinic_2.is_nan());
        assert!(proportions[1].clinic_1.is_nan());
    }

    #[test]
    fn all_charts() {
        let charts = analysis().charts();
        let titles: Vec<_> = charts.iter().map(|c| c.title.as_ref()).collect();
        assert_eq!(
            titles,
            [
                "Clinic 1: Number of Deaths per Year",
                "Clinic 2: Number of Deaths per Year",
                "Proportion of Deaths per Year",
                "Before Handwashing",
                "After Handwashing",
                "Before and After Handwashing",
            ]
        );
        assert_eq!(charts[0].series[0].color, Color::RED);
        assert_eq!(charts[1].series[0].color, Color::GREEN);
        assert_eq!(
            charts[0].series[0].mark,
            crate::chart::Mark::Bar { width: 0.6 }
        );
        assert_eq!(charts[3].series[0].points.len(), 5);
        assert_eq!(charts[4].series[0].points.len(), 3);
        assert_eq!(charts[5].series.len(), 2);
        assert!(charts.iter().all(|c| c.size == (10., 4.)));
    }

    #[test]
    fn json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = analysis().report();
        report.save_json(&path, false).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["threshold"], "1847-06-01");
        assert_eq!(value["deaths_by_clinic"]["clinic 1"], 1989);
        assert_eq!(value["before"]["count"], 5);

        assert!(report.save_json(&path, false).is_err());
        report.save_json(&path, true).unwrap();
    }

    #[test]
    fn undefined_values_are_null_in_json() {
        let yearly: YearlyTable = vec![YearlyRecord {
            clinic: Clinic::One,
            year: 1841,
            births: 0,
            deaths: 0,
        }]
        .into();
        let monthly: MonthlyTable = Vec::new().into();
        let report = Analysis::new(&yearly, &monthly, handwashing_start()).report();
        assert!(report.mean_difference.is_nan());
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["mean_difference"].is_null());
        assert!(value["yearly_proportions"][0]["clinic_1"].is_null());
    }
}

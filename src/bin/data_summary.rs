use clap::Parser;
use handwashing_analysis::{
    data_path, header, load_monthly, load_yearly,
    stats::{describe, Field},
    Clinic, Counts, Records, TableRow,
};
use itertools::Itertools;
use qu::ick_use::*;
use std::path::PathBuf;
use term_data_table::{Cell, Row, Table};

/// Print the shape, columns, first rows and span of both datasets.
#[derive(Debug, Parser)]
struct Opt {
    #[clap(long, default_value_os_t = data_path("yearly_deaths_by_clinic.xlsx"))]
    yearly: PathBuf,
    #[clap(long, default_value_os_t = data_path("monthly_deaths.xlsx"))]
    monthly: PathBuf,
    /// Number of rows to show from the start of each dataset.
    #[clap(long, short = 'n', default_value_t = 5)]
    head: usize,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let yearly = load_yearly(&opt.yearly).context("loading yearly deaths by clinic")?;
    let monthly = load_monthly(&opt.monthly).context("loading monthly deaths")?;

    header("Yearly deaths by clinic");
    summarise(&yearly, &["int", "u32", "u32", "clinic"]);
    println!("{}", yearly.head(opt.head));
    match yearly.iter().map(|row| row.year).minmax().into_option() {
        Some((first, last)) => println!("years {} to {}", first, last),
        None => println!("no years"),
    }
    for clinic in Clinic::ALL {
        let count = yearly.iter().filter(|row| row.clinic == clinic).count();
        println!("{} rows for {}", count, clinic);
    }

    header("Monthly deaths");
    summarise(&monthly, &["date", "u32", "u32"]);
    println!("{}", monthly.head(opt.head));
    match (monthly.first(), monthly.last()) {
        (Some(first), Some(last)) => println!("months {} to {}", first.date, last.date),
        _ => println!("no months"),
    }
    Ok(())
}

/// Shape, then one line per column with its type and count statistics.
fn summarise<R>(table: &Records<R>, types: &[&str])
where
    R: TableRow + Counts,
{
    println!("{} rows x {} columns", table.len(), R::headers().len());
    println!("{}", column_table(table, types));
}

fn column_table<R>(table: &Records<R>, types: &[&str]) -> String
where
    R: TableRow + Counts,
{
    let mut info = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("column"))
            .with_cell(Cell::from("type"))
            .with_cell(Cell::from("mean"))
            .with_cell(Cell::from("min"))
            .with_cell(Cell::from("max")),
    );
    for (column, ty) in R::headers().iter().zip(types) {
        let mut row = Row::new()
            .with_cell(Cell::from(column.to_string()))
            .with_cell(Cell::from(ty.to_string()));
        let field = match *column {
            "births" => Some(Field::Births),
            "deaths" => Some(Field::Deaths),
            _ => None,
        };
        match field {
            Some(field) => {
                let summary = describe(table.iter(), field);
                row = row
                    .with_cell(Cell::from(format!("{:.1}", summary.mean)))
                    .with_cell(Cell::from(summary.min.to_string()))
                    .with_cell(Cell::from(summary.max.to_string()));
            }
            None => {
                for _ in 0..3 {
                    row = row.with_cell(Cell::from(""));
                }
            }
        }
        info.add_row(row);
    }
    info.to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use handwashing_analysis::YearlyRecord;

    #[test]
    fn count_columns_are_described() {
        let table: Records<YearlyRecord> = vec![
            YearlyRecord {
                clinic: Clinic::One,
                year: 1841,
                births: 3036,
                deaths: 237,
            },
            YearlyRecord {
                clinic: Clinic::Two,
                year: 1841,
                births: 2442,
                deaths: 86,
            },
        ]
        .into();
        let text = column_table(&table, &["int", "u32", "u32", "clinic"]);
        assert!(!text.contains("non-empty"));
        assert!(text.contains("2739.0"));
        assert!(text.contains("161.5"));
        assert!(text.contains("3036"));
        assert!(text.contains("86"));
    }
}

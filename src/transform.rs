//! Deriving the proportion of deaths, and splitting tables into partitions.
use crate::{Clinic, ClinicYear, Counts, Dated, Partition, Proportioned, Records};
use chrono::NaiveDate;
use qu::ick_use::*;

/// Pair every record with its deaths / births.
///
/// This builds a new table and leaves `table` alone. A record with no births gets a NaN
/// proportion rather than stopping the run.
pub fn add_death_proportion<R>(table: &Records<R>) -> Records<Proportioned<R>>
where
    R: Counts + Clone,
{
    table
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let death_proportion = record.death_proportion();
            if death_proportion.is_nan() {
                event!(
                    Level::WARN,
                    "row {} has {} deaths and no births, its proportion of deaths is undefined",
                    idx,
                    record.deaths()
                );
            }
            Proportioned {
                record: record.clone(),
                death_proportion,
            }
        })
        .collect()
}

/// All records for `clinic`, in table order.
pub fn partition_by_clinic<R: ClinicYear>(table: &Records<R>, clinic: Clinic) -> Partition<'_, R> {
    table.filter(|record| record.clinic() == clinic)
}

/// Split records into those dated strictly before `threshold` and those on or after it.
///
/// Every record ends up in exactly one half, and both halves keep table order.
pub fn partition_by_date<R: Dated>(
    table: &Records<R>,
    threshold: NaiveDate,
) -> (Partition<'_, R>, Partition<'_, R>) {
    let (before, after): (Vec<&R>, Vec<&R>) =
        table.iter().partition(|record| record.date() < threshold);
    (before.into_iter().collect(), after.into_iter().collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{handwashing_start, MonthlyRecord, YearlyRecord};

    fn monthly() -> Records<MonthlyRecord> {
        [
            (1847, 4, 1, 312, 57),
            (1847, 5, 1, 294, 36),
            (1847, 6, 1, 268, 6),
            (1847, 7, 1, 250, 3),
            (1847, 8, 1, 264, 5),
        ]
        .into_iter()
        .map(|(y, m, d, births, deaths)| MonthlyRecord {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            births,
            deaths,
        })
        .collect()
    }

    fn yearly() -> Records<YearlyRecord> {
        [
            (Clinic::One, 1841, 3036, 237),
            (Clinic::Two, 1841, 2442, 86),
            (Clinic::One, 1842, 3287, 518),
            (Clinic::Two, 1842, 2659, 202),
        ]
        .into_iter()
        .map(|(clinic, year, births, deaths)| YearlyRecord {
            clinic,
            year,
            births,
            deaths,
        })
        .collect()
    }

    #[test]
    fn proportions() {
        let table = yearly();
        let with_prop = add_death_proportion(&table);
        assert_eq!(with_prop.len(), table.len());
        assert!((with_prop[0].death_proportion - 0.0781).abs() < 1e-4);
        assert!((with_prop[1].death_proportion - 0.0352).abs() < 1e-4);
        // the derived table still reads like the source
        assert_eq!(with_prop[2].year, 1842);
        assert_eq!(with_prop[2].record, table[2]);
    }

    #[test]
    fn no_births_gives_undefined_proportion() {
        let table: Records<MonthlyRecord> = vec![
            MonthlyRecord {
                date: NaiveDate::from_ymd_opt(1841, 1, 1).unwrap(),
                births: 0,
                deaths: 2,
            },
            MonthlyRecord {
                date: NaiveDate::from_ymd_opt(1841, 2, 1).unwrap(),
                births: 100,
                deaths: 2,
            },
        ]
        .into();
        let with_prop = add_death_proportion(&table);
        assert!(with_prop[0].death_proportion.is_nan());
        assert_eq!(with_prop[1].death_proportion, 0.02);
    }

    #[test]
    fn clinic_partition_keeps_order() {
        let table = yearly();
        let clinic_1 = partition_by_clinic(&table, Clinic::One);
        let years: Vec<_> = clinic_1.iter().map(|r| r.year).collect();
        assert_eq!(years, [1841, 1842]);
        assert!(clinic_1.iter().all(|r| r.clinic == Clinic::One));
        let clinic_2 = partition_by_clinic(&table, Clinic::Two);
        assert_eq!(clinic_1.len() + clinic_2.len(), table.len());
    }

    #[test]
    fn threshold_day_counts_as_after() {
        let table = monthly();
        let (before, after) = partition_by_date(&table, handwashing_start());
        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 3);
        assert_eq!(after[0].date, handwashing_start());
        assert!(before.iter().all(|r| r.date < handwashing_start()));
    }

    #[test]
    fn date_partition_is_total() {
        let table = monthly();
        let thresholds = [
            NaiveDate::from_ymd_opt(1700, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1847, 5, 15).unwrap(),
            NaiveDate::from_ymd_opt(1847, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(1900, 1, 1).unwrap(),
        ];
        for threshold in thresholds {
            let (before, after) = partition_by_date(&table, threshold);
            assert_eq!(before.len() + after.len(), table.len());
            // no record on both sides
            assert!(before
                .iter()
                .all(|b| after.iter().all(|a| !std::ptr::eq(a, b))));
        }
    }
}

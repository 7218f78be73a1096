//! Per-city traffic-stop report built from the aggregator's operations.
//!
//! A [`CityReport`] serializes to JSON with `serde` and renders as plain text through `Display`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::aggregate::{
    DistinctSet, FrequencyCounter, Key, KeySelector, NestedCounter, NumericSummary, RangeBucket,
    RangeBuckets, RowAggregator, derive, filter,
};
use crate::error::AggregateResult;
use crate::types::{DataSet, Value};

/// Column names of the Stanford Open Policing schema used by the report.
pub mod columns {
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const OUTCOME: &str = "outcome";
    pub const SUBJECT_RACE: &str = "subject_race";
    pub const SUBJECT_SEX: &str = "subject_sex";
    pub const SUBJECT_AGE: &str = "subject_age";
    pub const ARREST_MADE: &str = "arrest_made";
    pub const OFFICER_YEARS_OF_SERVICE: &str = "officer_years_of_service";
}

/// Arrests are counted for years strictly between these bounds.
pub const ARREST_YEARS: (i32, i32) = (2011, 2017);

/// Counts per category, with shares over the non-missing rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub counts: FrequencyCounter<Key>,
    /// Percent of non-missing rows, rounded to two decimals.
    pub percentages: BTreeMap<Key, f64>,
    pub missing: u64,
}

impl Breakdown {
    fn from_counts(counts: FrequencyCounter<Key>, missing: u64) -> Self {
        let percentages = counts
            .percentages()
            .into_iter()
            .map(|(k, p)| (k.clone(), round2(p)))
            .collect();
        Self {
            counts,
            percentages,
            missing,
        }
    }
}

/// Everything reported for one city's stop file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityReport {
    pub name: String,
    pub rows: usize,
    pub outcomes: Vec<Key>,
    pub race: Breakdown,
    pub gender: Breakdown,
    pub age: Option<NumericSummary>,
    pub stops_by_weekday: FrequencyCounter<Key>,
    /// Present when the file has a `time` column.
    pub stops_by_hour: Option<FrequencyCounter<Key>>,
    pub arrests_by_year: FrequencyCounter<i32>,
    pub stops_by_year_and_race: NestedCounter<Key, Key>,
    /// Present when the file has an `officer_years_of_service` column.
    pub missing_race_by_years_of_service: Option<FrequencyCounter<RangeBucket>>,
}

impl CityReport {
    /// Build the report for `dataset`.
    ///
    /// The `date`, `outcome`, `subject_race`, `subject_sex` and `subject_age` columns are required.
    /// Malformed values are handled by `aggregator`'s policy.
    pub fn build(
        name: impl Into<String>,
        dataset: &DataSet,
        aggregator: &RowAggregator,
    ) -> AggregateResult<Self> {
        let header = dataset.header();

        let outcomes: DistinctSet<Key> = aggregator.collect_distinct(dataset, columns::OUTCOME)?.value;

        let race = aggregator.count_by(dataset, &KeySelector::column(columns::SUBJECT_RACE))?;
        let gender = aggregator.count_by(dataset, &KeySelector::column(columns::SUBJECT_SEX))?;

        let age = aggregator
            .numeric_summary(dataset, columns::SUBJECT_AGE, is_non_negative_number)?
            .value;

        let stops_by_weekday = aggregator
            .count_by(dataset, &KeySelector::derived(columns::DATE, derive::weekday))?
            .value;

        let stops_by_hour = if header.contains(columns::TIME) {
            Some(
                aggregator
                    .count_by(dataset, &KeySelector::derived(columns::TIME, derive::hour))?
                    .value,
            )
        } else {
            None
        };

        let (low, high) = ARREST_YEARS;
        let arrests_by_year = if header.contains(columns::ARREST_MADE) {
            let arrests = filter(dataset, |r| r.get(columns::ARREST_MADE).is_some_and(is_true));
            aggregator.year_range_count(&arrests, columns::DATE, low, high)?
        } else {
            aggregator.year_range_count(dataset, columns::DATE, low, high)?
        }
        .value;

        let stops_by_year_and_race = aggregator
            .count_by_nested(
                dataset,
                &KeySelector::derived(columns::DATE, derive::year),
                &KeySelector::column(columns::SUBJECT_RACE),
            )?
            .value;

        let missing_race_by_years_of_service = if header.contains(columns::OFFICER_YEARS_OF_SERVICE) {
            let missing_race = filter(dataset, |r| r.is_missing(columns::SUBJECT_RACE));
            Some(
                aggregator
                    .bucketed_range_count(
                        &missing_race,
                        columns::OFFICER_YEARS_OF_SERVICE,
                        &RangeBuckets::years_of_service(),
                    )?
                    .value,
            )
        } else {
            None
        };

        Ok(Self {
            name: name.into(),
            rows: dataset.row_count(),
            outcomes: outcomes.into_sorted_vec(),
            race: Breakdown::from_counts(race.value, race.stats.rows_missing),
            gender: Breakdown::from_counts(gender.value, gender.stats.rows_missing),
            age,
            stops_by_weekday,
            stops_by_hour,
            arrests_by_year,
            stops_by_year_and_race,
            missing_race_by_years_of_service,
        })
    }
}

fn is_non_negative_number(value: &Value) -> bool {
    value.as_f64().is_some_and(|v| v >= 0.0)
}

fn is_true(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("true"))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn write_counts<'a, K, I>(f: &mut fmt::Formatter<'_>, entries: I) -> fmt::Result
where
    K: fmt::Display + 'a,
    I: IntoIterator<Item = (&'a K, u64)>,
{
    let mut first = true;
    for (k, n) in entries {
        if !first {
            f.write_str(", ")?;
        }
        write!(f, "{k}={n}")?;
        first = false;
    }
    if first {
        f.write_str("(none)")?;
    }
    Ok(())
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("  raw: ")?;
        write_counts(f, self.counts.iter())?;
        writeln!(f, "; missing={}", self.missing)?;
        f.write_str("  percent:")?;
        if self.percentages.is_empty() {
            f.write_str(" (none)")?;
        }
        for (k, p) in &self.percentages {
            write!(f, " {k}={p:.2}")?;
        }
        writeln!(f)
    }
}

impl fmt::Display for CityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ({} rows) ==", self.name, self.rows)?;

        f.write_str("Outcomes: ")?;
        let outcomes: Vec<String> = self.outcomes.iter().map(ToString::to_string).collect();
        writeln!(f, "[{}]", outcomes.join(", "))?;

        writeln!(f, "Race breakdown:")?;
        write!(f, "{}", self.race)?;
        writeln!(f, "Gender breakdown:")?;
        write!(f, "{}", self.gender)?;

        match &self.age {
            Some(age) => writeln!(
                f,
                "Age: lowest={} highest={} average={:.2} median={} (n={})",
                age.min, age.max, age.mean, age.median, age.count
            )?,
            None => writeln!(f, "Age: no numeric ages")?,
        }

        f.write_str("Stops by weekday (Mon=1): ")?;
        write_counts(f, self.stops_by_weekday.iter())?;
        writeln!(f)?;

        if let Some(hours) = &self.stops_by_hour {
            f.write_str("Stops by hour: ")?;
            write_counts(f, hours.iter())?;
            writeln!(f)?;
        }

        let (low, high) = ARREST_YEARS;
        write!(f, "Arrests per year ({low} < year < {high}): ")?;
        write_counts(f, self.arrests_by_year.iter())?;
        writeln!(f)?;

        writeln!(f, "Stops by race per year:")?;
        for (year, races) in self.stops_by_year_and_race.iter() {
            write!(f, "  {year}: ")?;
            write_counts(f, races.iter())?;
            writeln!(f)?;
        }

        if let Some(buckets) = &self.missing_race_by_years_of_service {
            f.write_str("Missing race by officer years of service: ")?;
            write_counts(f, buckets.iter())?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CityReport, round2};
    use crate::aggregate::{Key, RangeBucket, RowAggregator};
    use crate::error::AggregateError;
    use crate::types::{DataSet, Value};
    use chrono::{NaiveDate, NaiveTime};

    fn text(s: &str) -> Value {
        Value::Utf8(s.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn stops() -> DataSet {
        DataSet::from_rows(
            vec![
                "date",
                "time",
                "subject_race",
                "subject_sex",
                "subject_age",
                "outcome",
                "arrest_made",
                "officer_years_of_service",
            ],
            vec![
                vec![
                    date(2012, 1, 2),
                    Value::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap()),
                    text("white"),
                    text("male"),
                    Value::Int64(30),
                    text("warning"),
                    text("FALSE"),
                    Value::Int64(3),
                ],
                vec![
                    date(2013, 6, 4),
                    Value::Time(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
                    text("black"),
                    text("female"),
                    Value::Int64(41),
                    text("arrest"),
                    text("TRUE"),
                    Value::Int64(12),
                ],
                vec![
                    date(2013, 6, 5),
                    Value::Missing,
                    Value::Missing,
                    text("male"),
                    Value::Missing,
                    text("citation"),
                    text("TRUE"),
                    Value::Int64(7),
                ],
                vec![
                    date(2018, 3, 1),
                    Value::Time(NaiveTime::from_hms_opt(8, 45, 0).unwrap()),
                    text("white"),
                    Value::Missing,
                    Value::Int64(-1),
                    text("warning"),
                    text("TRUE"),
                    Value::Missing,
                ],
            ],
        )
    }

    #[test]
    fn builds_every_section() {
        let report = CityReport::build("testville", &stops(), &RowAggregator::default()).unwrap();

        assert_eq!(report.rows, 4);
        assert_eq!(
            report.outcomes,
            vec![Key::from("arrest"), Key::from("citation"), Key::from("warning")]
        );

        assert_eq!(report.race.counts.get(&Key::from("white")), 2);
        assert_eq!(report.race.missing, 1);
        assert_eq!(report.race.percentages[&Key::from("white")], 66.67);
        assert_eq!(report.race.percentages[&Key::from("black")], 33.33);
        assert_eq!(report.gender.missing, 1);

        let age = report.age.unwrap();
        assert_eq!(age.count, 2);
        assert_eq!(age.median, 35.5);

        // 2012-01-02 and 2018-03-01 are Mondays and Thursdays.
        assert_eq!(report.stops_by_weekday.get(&Key::from(1)), 1);
        assert_eq!(report.stops_by_weekday.get(&Key::from(4)), 1);
        assert_eq!(report.stops_by_hour.unwrap().get(&Key::from(8)), 2);

        // 2018 is outside the range, 2012 had no arrest.
        assert_eq!(report.arrests_by_year.get(&2013), 2);
        assert_eq!(report.arrests_by_year.total(), 2);

        assert_eq!(
            report
                .stops_by_year_and_race
                .get(&Key::from(2013), &Key::from("black")),
            1
        );

        let buckets = report.missing_race_by_years_of_service.unwrap();
        assert_eq!(buckets.get(&RangeBucket { low: 6, high: 10 }), 1);
        assert_eq!(buckets.total(), 1);
    }

    #[test]
    fn optional_sections_need_their_columns() {
        let ds = DataSet::from_rows(
            vec!["date", "subject_race", "subject_sex", "subject_age", "outcome"],
            vec![vec![
                date(2014, 2, 2),
                text("white"),
                text("female"),
                Value::Int64(22),
                text("warning"),
            ]],
        );
        let report = CityReport::build("small", &ds, &RowAggregator::default()).unwrap();
        assert!(report.stops_by_hour.is_none());
        assert!(report.missing_race_by_years_of_service.is_none());
        // Without arrest_made every stop counts.
        assert_eq!(report.arrests_by_year.get(&2014), 1);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let ds = DataSet::from_rows(vec!["date"], vec![vec![date(2014, 2, 2)]]);
        let err = CityReport::build("bad", &ds, &RowAggregator::default()).unwrap_err();
        assert!(matches!(err, AggregateError::UnknownColumn { ref column, .. } if column == "outcome"));
    }

    #[test]
    fn text_rendering_mentions_each_section() {
        let report = CityReport::build("testville", &stops(), &RowAggregator::default()).unwrap();
        let text = report.to_string();
        assert!(text.starts_with("== testville (4 rows) =="));
        assert!(text.contains("Outcomes: [arrest, citation, warning]"));
        assert!(text.contains("missing=1"));
        assert!(text.contains("Arrests per year (2011 < year < 2017): 2013=2"));
        assert!(text.contains("Missing race by officer years of service: 6-10=1"));
    }

    #[test]
    fn json_uses_string_keys() {
        let report = CityReport::build("testville", &stops(), &RowAggregator::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["race"]["counts"]["white"], 2);
        assert_eq!(json["arrests_by_year"]["2013"], 2);
        assert_eq!(json["missing_race_by_years_of_service"]["6-10"], 1);
        assert_eq!(json["stops_by_year_and_race"]["2013"]["black"], 1);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(100.0 / 3.0), 33.33);
        assert_eq!(round2(200.0 / 3.0), 66.67);
    }
}

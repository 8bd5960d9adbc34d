//! Display summaries over a range of readings.

use crate::codec::Reading;
use serde::Serialize;

/// One point of a temperature series: time in epoch milliseconds and °F.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: i64,
    pub value: f64,
}

impl From<&Reading> for SeriesPoint {
    fn from(reading: &Reading) -> Self {
        Self { date: reading.timestamp.saturating_mul(1000), value: reading.temp_f }
    }
}

/// Min, max and latest temperature of a sensor plus the full series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub name: String,
    pub max_reading: SeriesPoint,
    pub min_reading: SeriesPoint,
    pub last_reading: SeriesPoint,
    pub series: Vec<SeriesPoint>,
}

/// Summarize readings that are already ordered oldest first.
///
/// Max and min are taken on `temp_f`; on ties the earliest reading wins.
/// An empty slice gives `Summary::default()`.
pub fn summarize(readings: &[Reading]) -> Summary {
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return Summary::default();
    };

    let mut max = first;
    let mut min = first;
    for reading in &readings[1..] {
        if reading.temp_f > max.temp_f {
            max = reading;
        }
        if reading.temp_f < min.temp_f {
            min = reading;
        }
    }

    Summary {
        name: first.sensor_id.clone(),
        max_reading: max.into(),
        min_reading: min.into(),
        last_reading: last.into(),
        series: readings.iter().map(SeriesPoint::from).collect(),
    }
}

/// Summaries of several sensors shown together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub page: String,
    pub summaries: Vec<Summary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(timestamp: i64, temp_f: f64) -> Reading {
        Reading {
            sensor_id: "sensor1".to_string(),
            timestamp,
            humidity: 40.0,
            temp_c: 20.0,
            temp_f,
            heat_index_c: 20.0,
            heat_index_f: 68.0,
        }
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[test]
    fn test_summary_min_max_last() {
        let readings =
            vec![reading(60, 68.0), reading(120, 71.5), reading(180, 65.2), reading(240, 69.9)];
        let summary = summarize(&readings);

        assert_eq!(summary.name, "sensor1");
        assert_eq!(summary.max_reading, SeriesPoint { date: 120_000, value: 71.5 });
        assert_eq!(summary.min_reading, SeriesPoint { date: 180_000, value: 65.2 });
        assert_eq!(summary.last_reading, SeriesPoint { date: 240_000, value: 69.9 });

        let dates: Vec<_> = summary.series.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![60_000, 120_000, 180_000, 240_000]);
    }

    #[test]
    fn test_ties_keep_first_occurrence() {
        let readings = vec![reading(1, 70.0), reading(2, 70.0), reading(3, 70.0)];
        let summary = summarize(&readings);

        assert_eq!(summary.max_reading.date, 1000);
        assert_eq!(summary.min_reading.date, 1000);
        assert_eq!(summary.last_reading.date, 3000);
    }

    #[test]
    fn test_single_reading() {
        let summary = summarize(&[reading(10, 55.5)]);
        assert_eq!(summary.max_reading, summary.min_reading);
        assert_eq!(summary.last_reading, summary.max_reading);
        assert_eq!(summary.series.len(), 1);
    }

    #[test]
    fn test_summary_serializes_for_renderer() {
        let summary = summarize(&[reading(10, 55.5)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["name"], "sensor1");
        assert_eq!(json["lastReading"]["date"], 10_000);
        assert_eq!(json["series"].as_array().unwrap().len(), 1);
    }
}

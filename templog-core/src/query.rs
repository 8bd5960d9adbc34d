//! Read-only queries for the presentation layer.
//!
//! Safe to call concurrently with ingestion.

use crate::codec::Reading;
use crate::error::Result;
use crate::store::SensorStore;
use crate::summary::{summarize, Page, Summary};
use chrono::{DateTime, Duration, Utc};
use tracing::{instrument, warn};

/// Look-back windows offered by the web pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageWindow {
    /// Last two days
    Daily,
    /// Last seven days
    Weekly,
}

impl PageWindow {
    pub fn duration(self) -> Duration {
        match self {
            PageWindow::Daily => Duration::days(2),
            PageWindow::Weekly => Duration::days(7),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PageWindow::Daily => "Daily",
            PageWindow::Weekly => "Weekly",
        }
    }

    /// Window ending at `now`.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }
}

#[derive(Clone)]
pub struct QueryService {
    store: SensorStore,
}

impl QueryService {
    pub fn new(store: SensorStore) -> Self {
        Self { store }
    }

    /// Readings strictly between `begin` and `end`, oldest first.
    pub async fn get_range(
        &self,
        sensor_id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        self.store.retrieve(sensor_id, begin, end).await
    }

    /// Summary of the readings strictly between `begin` and `end`.
    ///
    /// The summary is named after `sensor_id` even when the range is empty.
    pub async fn get_summary(
        &self,
        sensor_id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Summary> {
        let readings = self.get_range(sensor_id, begin, end).await?;
        let mut summary = summarize(&readings);
        summary.name = sensor_id.to_string();
        Ok(summary)
    }

    /// Summaries of `sensors` over `window` ending at `now`.
    ///
    /// A sensor whose query fails is logged and left off the page.
    #[instrument(skip(self, sensors), fields(window = window.title()))]
    pub async fn get_page(
        &self,
        sensors: &[&str],
        window: PageWindow,
        now: DateTime<Utc>,
    ) -> Page {
        let (begin, end) = window.bounds(now);
        let mut summaries = Vec::with_capacity(sensors.len());

        for sensor_id in sensors {
            match self.get_summary(sensor_id, begin, end).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(sensor = %sensor_id, "Omitting sensor from page: {}", e),
            }
        }

        Page { page: window.title().to_string(), summaries }
    }
}

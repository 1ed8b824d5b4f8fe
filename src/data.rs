use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

pub const APP_ID: &str = "com.pandemicatlas.PandemicAtlas";

/// Placeholder shown when the upstream record carries no timestamp
pub const NO_TIMESTAMP: &str = "not specified";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldTotal {
    #[serde(default)]
    pub confirmed: u64,
    #[serde(default)]
    pub recovered: u64,
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Country directory entry as the API sends it. Any field may be null.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawCountry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alpha2code: Option<String>,
    #[serde(default)]
    pub alpha3code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A directory entry that has everything needed to place it on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub name: String,
    pub code: String,
    pub alpha3: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Country {
    /// Keeps only entries that carry latitude, longitude and an alpha-2 code.
    pub fn from_raw(raw: RawCountry) -> Option<Self> {
        let (latitude, longitude, code) = match (raw.latitude, raw.longitude, raw.alpha2code) {
            (Some(lat), Some(lon), Some(code)) if !code.is_empty() => (lat, lon, code),
            _ => return None,
        };

        Some(Country {
            name: raw.name.unwrap_or_default(),
            code,
            alpha3: raw.alpha3code,
            latitude,
            longitude,
        })
    }
}

/// Drops directory entries missing geocoding fields.
pub fn ingest_countries(raw: Vec<RawCountry>) -> Vec<Country> {
    raw.into_iter().filter_map(Country::from_raw).collect()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountryDetail {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub confirmed: u64,
    #[serde(default)]
    pub recovered: u64,
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
}

/// One line of the results table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableRow {
    pub confirmed: u64,
    pub critical: u64,
    pub deaths: u64,
    pub recovered: u64,
}

impl From<&WorldTotal> for TableRow {
    fn from(total: &WorldTotal) -> Self {
        TableRow {
            confirmed: total.confirmed,
            critical: total.critical,
            deaths: total.deaths,
            recovered: total.recovered,
        }
    }
}

impl From<&CountryDetail> for TableRow {
    fn from(detail: &CountryDetail) -> Self {
        TableRow {
            confirmed: detail.confirmed,
            critical: detail.critical,
            deaths: detail.deaths,
            recovered: detail.recovered,
        }
    }
}

/// The three upstream requests the dashboard issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    WorldTotal,
    Countries,
    CountryDetail,
}

impl RequestKind {
    pub fn user_message(self) -> &'static str {
        match self {
            RequestKind::WorldTotal => "World data requests are currently limited, please try again later",
            RequestKind::Countries => "Search data requests are currently limited, please try again later",
            RequestKind::CountryDetail => "Country data requests are currently limited, please try again later",
        }
    }
}

/// Accepts RFC 3339 timestamps, offset-less ones (read as UTC) and null.
/// Anything else becomes `None` rather than failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(text)) = raw else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    match NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Ok(Some(naive.and_utc())),
        Err(_) => {
            log::debug!("Unparsable timestamp {:?}", text);
            Ok(None)
        }
    }
}

/// Renders a timestamp the way the table header shows it: the UTC string
/// without its weekday, e.g. `01 Jan 2024 00:00:00`.
pub fn format_last_update(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(dt) => {
            let utc_string = dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            utc_string
                .split(' ')
                .skip(1)
                .take(4)
                .collect::<Vec<_>>()
                .join(" ")
        }
        None => NO_TIMESTAMP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(name: &str, lat: Option<f64>, lon: Option<f64>, code: Option<&str>) -> RawCountry {
        RawCountry {
            name: Some(name.to_string()),
            alpha2code: code.map(str::to_string),
            alpha3code: None,
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn ingestion_drops_entries_missing_geocoding() {
        let retained = ingest_countries(vec![
            raw("A", Some(1.0), Some(1.0), Some("AA")),
            raw("B", None, Some(2.0), Some("BB")),
            raw("C", Some(3.0), None, Some("CC")),
            raw("D", Some(4.0), Some(4.0), None),
        ]);

        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].name, "A");
        assert_eq!(retained[0].code, "AA");
    }

    #[test]
    fn ingestion_keeps_adjacent_valid_entries() {
        let retained = ingest_countries(vec![
            raw("B", None, Some(2.0), Some("BB")),
            raw("C", None, Some(2.0), Some("CC")),
            raw("D", Some(0.0), Some(0.0), Some("DD")),
        ]);

        let names: Vec<_> = retained.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["D"]);
    }

    #[test]
    fn last_update_drops_weekday() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_last_update(Some(ts)), "01 Jan 2024 00:00:00");
    }

    #[test]
    fn last_update_without_timestamp() {
        assert_eq!(format_last_update(None), "not specified");
    }

    #[test]
    fn world_total_parses_upstream_payload() {
        let payload = r#"[{"confirmed":2345,"recovered":12,"critical":3,"deaths":7,
            "lastChange":"2020-04-18T15:00:04+02:00","lastUpdate":null}]"#;
        let totals: Vec<WorldTotal> = serde_json::from_str(payload).unwrap();

        assert_eq!(totals[0].confirmed, 2345);
        assert_eq!(totals[0].last_update, None);
        assert_eq!(
            totals[0].last_change,
            Some(Utc.with_ymd_and_hms(2020, 4, 18, 13, 0, 4).unwrap())
        );
    }

    #[test]
    fn offset_less_timestamp_is_read_as_utc() {
        let payload = r#"[{"confirmed":5,"recovered":0,"critical":0,"deaths":0,
            "lastChange":"2020-04-18T15:00:04","lastUpdate":"2020-04-18T15:00:04.250"}]"#;
        let totals: Vec<WorldTotal> = serde_json::from_str(payload).unwrap();

        assert_eq!(totals[0].confirmed, 5);
        assert_eq!(
            totals[0].last_change,
            Some(Utc.with_ymd_and_hms(2020, 4, 18, 15, 0, 4).unwrap())
        );
        assert_eq!(format_last_update(totals[0].last_update), "18 Apr 2020 15:00:04");
    }

    #[test]
    fn garbage_timestamp_keeps_the_counts() {
        let payload = r#"[{"country":"Italy","code":"IT","confirmed":7,"recovered":1,"critical":0,
            "deaths":2,"latitude":41.8,"longitude":12.5,"lastChange":"yesterday","lastUpdate":12345}]"#;
        let details: Vec<CountryDetail> = serde_json::from_str(payload).unwrap();

        assert_eq!(details[0].confirmed, 7);
        assert_eq!(details[0].last_change, None);
        assert_eq!(format_last_update(details[0].last_update), "not specified");
    }

    #[test]
    fn missing_timestamp_fields_default_to_none() {
        let totals: Vec<WorldTotal> = serde_json::from_str(r#"[{"confirmed":1}]"#).unwrap();
        assert_eq!(totals[0].last_update, None);
    }

    #[test]
    fn table_row_keeps_displayed_columns() {
        let detail = CountryDetail {
            country: "Italy".into(),
            code: "IT".into(),
            confirmed: 10,
            recovered: 4,
            critical: 2,
            deaths: 1,
            latitude: 41.8,
            longitude: 12.5,
            last_change: None,
            last_update: None,
        };
        let row = TableRow::from(&detail);
        assert_eq!(row, TableRow { confirmed: 10, critical: 2, deaths: 1, recovered: 4 });
    }
}

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use color_eyre::eyre::{bail, Result, WrapErr};
use geo::{LineString, Point};
use itertools::Itertools;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, trace};

use crate::crs::Crs;

/// One position report from a tagged bird.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackPoint {
	pub bird_id: String,
	pub timestamp: DateTime<Utc>,
	/// x = longitude, y = latitude
	pub location: Point<f64>,
	pub crs: Crs,
}

impl TrackPoint {
	pub fn lat(&self) -> f64 {
		self.location.y()
	}

	pub fn lon(&self) -> f64 {
		self.location.x()
	}
}

/// The migration path of a single bird, in timestamp order.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
	pub bird_id: String,
	pub points: Vec<TrackPoint>,
}

impl Track {
	pub fn start(&self) -> Option<&TrackPoint> {
		self.points.first()
	}

	pub fn end(&self) -> Option<&TrackPoint> {
		self.points.last()
	}

	pub fn line(&self) -> LineString<f64> {
		self.points.iter().map(|p| p.location).collect()
	}
}

#[derive(Debug, Deserialize)]
struct Record {
	#[serde(rename = "tag-local-identifier")]
	bird_id: String,

	#[serde(deserialize_with = "timestamp_de")]
	timestamp: DateTime<Utc>,

	#[serde(rename = "location-lat")]
	lat: f64,

	#[serde(rename = "location-long")]
	lon: f64,
}

fn timestamp_de<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;

	let text = String::deserialize(deserializer)?;
	parse_timestamp(&text).map_err(Error::custom)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
	let text = text.trim();
	if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
		return Ok(dt.with_timezone(&Utc));
	}

	NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
		.or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
		.map(|naive| naive.and_utc())
		.map_err(|err| format!("invalid timestamp {:?}: {}", text, err))
}

/// Reads tracking records from a CSV file, tagging them as EPSG:4326.
pub async fn load_tracks(path: impl AsRef<Path>) -> Result<Vec<TrackPoint>> {
	let path = path.as_ref();
	debug!(?path, "reading tracking csv");

	let contents = tokio::fs::read(path)
		.await
		.wrap_err_with(|| format!("reading {}", path.display()))?;
	debug!(?path, bytes=%contents.len(), "read tracking file");

	let points = parse_tracks(&contents[..]).wrap_err_with(|| format!("parsing {}", path.display()))?;
	info!(?path, points=%points.len(), "loaded tracking records");
	Ok(points)
}

pub fn parse_tracks(reader: impl std::io::Read) -> Result<Vec<TrackPoint>> {
	let mut csv = csv::Reader::from_reader(reader);
	let mut points = Vec::new();
	for record in csv.deserialize::<Record>() {
		let record = record?;
		trace!(?record, "parsed tracking record");

		if !(-90.0..=90.0).contains(&record.lat) || !(-180.0..=180.0).contains(&record.lon) {
			bail!(
				"bird {} at {}: position ({}, {}) is not a latitude/longitude",
				record.bird_id,
				record.timestamp,
				record.lat,
				record.lon
			);
		}

		points.push(TrackPoint {
			bird_id: record.bird_id.trim().to_string(),
			timestamp: record.timestamp,
			location: Point::new(record.lon, record.lat),
			crs: Crs::Wgs84,
		});
	}

	Ok(points)
}

/// Groups points by bird, sorted by bird id, each track in timestamp order.
pub fn group_tracks(points: &[TrackPoint]) -> Vec<Track> {
	points
		.iter()
		.sorted_by(|a, b| a.bird_id.cmp(&b.bird_id).then(a.timestamp.cmp(&b.timestamp)))
		.group_by(|p| p.bird_id.clone())
		.into_iter()
		.map(|(bird_id, points)| Track {
			bird_id,
			points: points.cloned().collect(),
		})
		.collect()
}

/// Mean latitude and longitude of all points, as `(lat, lon)`.
pub fn center(points: &[TrackPoint]) -> Result<(f64, f64)> {
	if points.is_empty() {
		bail!("no tracking points to centre the map on");
	}

	if let Some(p) = points.iter().find(|p| p.crs != Crs::Wgs84) {
		bail!("bird {} has a point in {}, expected latitude/longitude", p.bird_id, p.crs);
	}

	let n = points.len() as f64;
	let lat = points.iter().map(TrackPoint::lat).sum::<f64>() / n;
	let lon = points.iter().map(TrackPoint::lon).sum::<f64>() / n;
	Ok((lat, lon))
}

/// Number of readings per bird.
pub fn summary(tracks: &[Track]) -> Vec<(String, usize)> {
	tracks
		.iter()
		.map(|t| (t.bird_id.clone(), t.points.len()))
		.collect()
}

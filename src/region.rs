use std::{
	collections::HashSet,
	path::{Path, PathBuf},
};

use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use futures::future::try_join_all;
use geo::{Area, Coord, EuclideanLength, Geometry, LineString, MultiPolygon, Polygon, Simplify};
use geojson::{GeoJson, JsonObject, JsonValue};
use serde::Serialize;
use shapefile::{dbase::FieldValue, PolygonRing, Shape};
use tracing::{debug, info, trace, warn};

use crate::crs::{self, Crs};

/// A named area (country, protected area) with its boundary.
#[derive(Clone, Debug)]
pub struct Region {
	pub name: String,
	pub geometry: MultiPolygon<f64>,
	pub crs: Crs,
	pub attributes: JsonObject,
}

impl Region {
	pub fn attr(&self, field: &str) -> Option<&JsonValue> {
		self.attributes.get(field).filter(|v| !v.is_null())
	}

	/// An attribute rendered as text, whatever its stored type.
	pub fn attr_text(&self, field: &str) -> Option<String> {
		match self.attr(field)? {
			JsonValue::String(s) => Some(s.trim().to_string()),
			JsonValue::Number(n) => Some(n.to_string()),
			JsonValue::Bool(b) => Some(b.to_string()),
			_ => None,
		}
	}

	pub fn attr_f64(&self, field: &str) -> Option<f64> {
		match self.attr(field)? {
			JsonValue::Number(n) => n.as_f64(),
			JsonValue::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	pub fn to_crs(&self, to: Crs) -> Result<Self> {
		let geometry = crs::reproject(&self.geometry, self.crs, to)
			.wrap_err_with(|| format!("reprojecting region {:?}", self.name))?;
		Ok(Self {
			geometry,
			crs: to,
			..self.clone()
		})
	}
}

/// Loads regions from a shapefile, a GeoJSON file, or a directory of either.
pub async fn load_regions(path: impl AsRef<Path>, name_field: &str) -> Result<Vec<Region>> {
	let path = path.as_ref();
	let regions = if path.is_dir() {
		load_region_dir(path, name_field).await?
	} else {
		load_region_file(path.to_owned(), name_field.to_owned()).await?
	};

	info!(?path, regions=%regions.len(), "loaded boundary regions");
	Ok(regions)
}

async fn load_region_dir(path: &Path, name_field: &str) -> Result<Vec<Region>> {
	let mut files = Vec::new();
	for pattern in ["*.shp", "*.geojson"] {
		for entry in glob::glob(path.join(pattern).display().to_string().as_str())? {
			let name_field = name_field.to_owned();
			files.push(tokio::spawn(async move { load_region_file(entry?, name_field).await }));
		}
	}

	if files.is_empty() {
		bail!("no .shp or .geojson files in {}", path.display());
	}

	Ok(try_join_all(files)
		.await?
		.into_iter()
		.collect::<Result<Vec<_>, _>>()?
		.into_iter()
		.flatten()
		.collect())
}

async fn load_region_file(path: PathBuf, name_field: String) -> Result<Vec<Region>> {
	let extension = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
	match extension.as_deref() {
		Some("shp") => tokio::task::spawn_blocking(move || read_shapefile(&path, &name_field)).await?,
		Some("geojson") | Some("json") => read_geojson(&path, &name_field).await,
		_ => Err(eyre!("unsupported boundary file: {}", path.display())),
	}
}

async fn read_geojson(path: &Path, name_field: &str) -> Result<Vec<Region>> {
	debug!(?path, "reading geojson");
	let contents = tokio::fs::read(path)
		.await
		.wrap_err_with(|| format!("reading {}", path.display()))?;
	debug!(?path, bytes=%contents.len(), "read geojson file");

	let geo = GeoJson::from_reader(&contents[..])?;
	trace!(?path, "parsed geojson");

	let features = match geo {
		GeoJson::FeatureCollection(fc) => fc.features,
		GeoJson::Feature(f) => vec![f],
		GeoJson::Geometry(g) => vec![geojson::Feature {
			geometry: Some(g),
			..Default::default()
		}],
	};

	let mut regions = Vec::with_capacity(features.len());
	for (n, feature) in features.into_iter().enumerate() {
		let attributes = feature.properties.unwrap_or_default();
		let geometry = match feature.geometry {
			Some(g) => Geometry::<f64>::try_from(g)?,
			None => {
				debug!(?path, %n, "feature without geometry, skipping");
				continue;
			}
		};

		let Some(geometry) = only_polys(geometry) else {
			debug!(?path, %n, "feature is not polygonal, skipping");
			continue;
		};

		regions.push(Region {
			name: region_name(&attributes, name_field, n),
			geometry,
			crs: Crs::Wgs84,
			attributes,
		});
	}

	Ok(regions)
}

fn read_shapefile(path: &Path, name_field: &str) -> Result<Vec<Region>> {
	debug!(?path, "reading shapefile");
	let crs = shapefile_crs(path)?;

	let mut reader = shapefile::Reader::from_path(path)
		.wrap_err_with(|| format!("opening shapefile {}", path.display()))?;

	let mut regions = Vec::new();
	for (n, entry) in reader.iter_shapes_and_records().enumerate() {
		let (shape, record) = entry.wrap_err_with(|| format!("reading record {} of {}", n, path.display()))?;

		let Some(geometry) = shape_polys(shape) else {
			debug!(?path, %n, "shape is not polygonal, skipping");
			continue;
		};

		let attributes: JsonObject = std::collections::HashMap::<String, FieldValue>::from(record)
			.into_iter()
			.map(|(k, v)| (k, field_json(v)))
			.collect();

		regions.push(Region {
			name: region_name(&attributes, name_field, n),
			geometry,
			crs,
			attributes,
		});
	}

	debug!(?path, %crs, regions=%regions.len(), "read shapefile");
	Ok(regions)
}

fn shapefile_crs(path: &Path) -> Result<Crs> {
	let prj = path.with_extension("prj");
	if !prj.exists() {
		debug!(?path, "no .prj sidecar, assuming EPSG:4326");
		return Ok(Crs::Wgs84);
	}

	let wkt = std::fs::read_to_string(&prj).wrap_err_with(|| format!("reading {}", prj.display()))?;
	Crs::from_wkt(&wkt).wrap_err_with(|| format!("in {}", prj.display()))
}

fn region_name(attributes: &JsonObject, name_field: &str, n: usize) -> String {
	match attributes.get(name_field) {
		Some(JsonValue::String(s)) => s.trim().to_string(),
		Some(v) if !v.is_null() => v.to_string(),
		_ => format!("#{}", n),
	}
}

fn field_json(value: FieldValue) -> JsonValue {
	match value {
		FieldValue::Character(Some(s)) | FieldValue::Memo(s) => JsonValue::String(s),
		FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => number_json(n),
		FieldValue::Float(Some(n)) => number_json(f64::from(n)),
		FieldValue::Integer(n) => JsonValue::from(n),
		FieldValue::Logical(Some(b)) => JsonValue::Bool(b),
		_ => JsonValue::Null,
	}
}

fn number_json(n: f64) -> JsonValue {
	if n.fract() == 0.0 && n.abs() < 9.0e15 {
		JsonValue::from(n as i64)
	} else {
		serde_json::Number::from_f64(n)
			.map(JsonValue::Number)
			.unwrap_or(JsonValue::Null)
	}
}

pub fn only_polys(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
	let polys: Vec<Polygon<f64>> = match geometry {
		Geometry::Polygon(p) => vec![p],
		Geometry::MultiPolygon(mp) => mp.0,
		Geometry::GeometryCollection(gc) => gc
			.0
			.into_iter()
			.filter_map(only_polys)
			.flat_map(|mp| mp.0)
			.collect(),
		_ => return None,
	};

	if polys.is_empty() {
		None
	} else {
		Some(MultiPolygon(polys))
	}
}

fn shape_polys(shape: Shape) -> Option<MultiPolygon<f64>> {
	match shape {
		Shape::Polygon(p) => rings_to_multipolygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
		Shape::PolygonM(p) => rings_to_multipolygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
		Shape::PolygonZ(p) => rings_to_multipolygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
		_ => None,
	}
}

/// Shapefile polygons are a flat list of rings; each outer ring starts a new
/// polygon and the inner rings that follow are its holes.
fn rings_to_multipolygon<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> Option<MultiPolygon<f64>> {
	let mut polys: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
	for ring in rings {
		let line = LineString(ring.points().iter().map(&xy).collect());
		match ring {
			PolygonRing::Outer(_) => polys.push((line, Vec::new())),
			PolygonRing::Inner(_) => match polys.last_mut() {
				Some((_, holes)) => holes.push(line),
				None => {
					warn!("inner ring before any outer ring, treating as outer");
					polys.push((line, Vec::new()));
				}
			},
		}
	}

	if polys.is_empty() {
		return None;
	}

	Some(MultiPolygon(
		polys
			.into_iter()
			.map(|(exterior, holes)| Polygon::new(exterior, holes))
			.collect(),
	))
}

pub fn reproject_all(regions: &[Region], to: Crs) -> Result<Vec<Region>> {
	regions.iter().map(|r| r.to_crs(to)).collect()
}

/// Keeps the regions whose `field` attribute equals one of `values`.
pub fn filter_by_attr(regions: &[Region], field: &str, values: &[&str]) -> Vec<Region> {
	let wanted: HashSet<&str> = values.iter().copied().collect();
	regions
		.iter()
		.filter(|r| r.attr_text(field).map_or(false, |v| wanted.contains(v.as_str())))
		.cloned()
		.collect()
}

/// Drops protected areas flagged as purely marine (`MARINE` == 2).
pub fn land_only(regions: &[Region]) -> Vec<Region> {
	let land: Vec<Region> = regions
		.iter()
		.filter(|r| r.attr_text("MARINE").as_deref() != Some("2"))
		.cloned()
		.collect();
	debug!(before=%regions.len(), after=%land.len(), "filtered out marine areas");
	land
}

/// Douglas–Peucker simplification of every polygon, dropping the ones that collapse.
///
/// The simplified ring always keeps at least four coordinates, so collapse is
/// judged on shape instead: a polygon whose mean width (2 × area / perimeter)
/// is under half the tolerance has been squashed onto a line.
pub fn simplify(regions: &[Region], epsilon: f64) -> Vec<Region> {
	let simplified: Vec<Region> = regions
		.iter()
		.filter_map(|r| {
			let polys: Vec<Polygon<f64>> = r
				.geometry
				.simplify(&epsilon)
				.0
				.into_iter()
				.filter(|p| !collapsed(p, epsilon))
				.collect();

			if polys.is_empty() {
				trace!(name=%r.name, "region collapsed during simplification");
				None
			} else {
				Some(Region {
					geometry: MultiPolygon(polys),
					..r.clone()
				})
			}
		})
		.collect();

	debug!(%epsilon, before=%regions.len(), after=%simplified.len(), "simplified regions");
	simplified
}

fn collapsed(polygon: &Polygon<f64>, epsilon: f64) -> bool {
	let area = polygon.unsigned_area();
	if area <= 0.0 {
		return true;
	}

	let perimeter = polygon.exterior().euclidean_length();
	4.0 * area < epsilon * perimeter
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ReportedArea {
	/// Σ(REP_AREA − REP_M_AREA), km²
	pub land_km2: f64,
	/// Records whose reported marine area exceeds the total
	pub anomalies: usize,
}

/// Land area of protected regions as reported in the WDPA attribute table.
pub fn reported_land_area(regions: &[Region]) -> ReportedArea {
	let mut reported = ReportedArea::default();
	for r in regions {
		let total = r.attr_f64("REP_AREA").unwrap_or(0.0);
		let marine = r.attr_f64("REP_M_AREA").unwrap_or(0.0);
		if total < marine {
			trace!(name=%r.name, %total, %marine, "marine area exceeds reported area");
			reported.anomalies += 1;
		}
		reported.land_km2 += total - marine;
	}

	if reported.anomalies > 0 {
		warn!(
			anomalies=%reported.anomalies,
			of=%regions.len(),
			"some areas report more marine area than total area, using values as they are"
		);
	}

	reported
}

use std::{fmt, str::FromStr};

use color_eyre::eyre::{bail, eyre, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use tracing::{debug, trace};

/// Coordinate reference systems this tool knows how to handle.
///
/// Geometry in `Wgs84` is stored as x = longitude, y = latitude, in degrees.
/// Geometry in `Laea3035` is stored as x = easting, y = northing, in metres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Crs {
	Wgs84,
	Laea3035,
}

impl Crs {
	pub fn epsg(self) -> u32 {
		match self {
			Self::Wgs84 => 4326,
			Self::Laea3035 => 3035,
		}
	}

	pub fn from_epsg(code: u32) -> Result<Self> {
		match code {
			4326 => Ok(Self::Wgs84),
			3035 => Ok(Self::Laea3035),
			_ => Err(eyre!("unsupported CRS: EPSG:{}", code)),
		}
	}

	/// Whether planar area computed in this CRS is proportional to surface area.
	pub fn is_equal_area(self) -> bool {
		matches!(self, Self::Laea3035)
	}

	/// Detects the CRS described by the WKT of a shapefile `.prj` sidecar.
	pub fn from_wkt(wkt: &str) -> Result<Self> {
		let upper = wkt.to_uppercase();
		trace!(wkt=%upper, "detecting crs from wkt");

		if upper.contains("PROJCS") {
			if upper.contains("LAMBERT_AZIMUTHAL_EQUAL_AREA") && upper.contains("ETRS") {
				return Ok(Self::Laea3035);
			}

			bail!("unsupported projected CRS in WKT: {}", wkt.trim());
		}

		if upper.contains("GEOGCS") && (upper.contains("WGS_1984") || upper.contains("WGS 84")) {
			return Ok(Self::Wgs84);
		}

		bail!("unsupported CRS in WKT: {}", wkt.trim())
	}
}

impl fmt::Display for Crs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "EPSG:{}", self.epsg())
	}
}

impl FromStr for Crs {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.to_lowercase();
		let code = lower.strip_prefix("epsg:").unwrap_or(&lower);
		code.parse::<u32>()
			.map_err(|err| format!("invalid CRS {}: {}", s, err))
			.and_then(|code| Self::from_epsg(code).map_err(|err| err.to_string()))
	}
}

// GRS80
const SEMI_MAJOR: f64 = 6_378_137.0;
const INV_FLATTENING: f64 = 298.257_222_101;

const LAT_ORIGIN: f64 = 52.0;
const LON_ORIGIN: f64 = 10.0;
const FALSE_EASTING: f64 = 4_321_000.0;
const FALSE_NORTHING: f64 = 3_210_000.0;

/// Ellipsoidal Lambert azimuthal equal-area projection, oblique aspect.
///
/// Constants are derived once from the ellipsoid and the projection origin;
/// see Snyder, "Map Projections: A Working Manual", pp. 187–190.
#[derive(Clone, Copy, Debug)]
struct Laea {
	e: f64,
	e2: f64,
	qp: f64,
	rq: f64,
	d: f64,
	sin_b1: f64,
	cos_b1: f64,
	lon0: f64,
	lat0: f64,
	false_easting: f64,
	false_northing: f64,
}

impl Laea {
	fn epsg3035() -> Self {
		let f = 1.0 / INV_FLATTENING;
		let e2 = f * (2.0 - f);
		let e = e2.sqrt();
		let lat0 = LAT_ORIGIN.to_radians();

		let qp = authalic_q(std::f64::consts::FRAC_PI_2, e, e2);
		let rq = SEMI_MAJOR * (qp / 2.0).sqrt();
		let b1 = (authalic_q(lat0, e, e2) / qp).asin();
		let m1 = lat0.cos() / (1.0 - e2 * lat0.sin().powi(2)).sqrt();
		let d = SEMI_MAJOR * m1 / (rq * b1.cos());

		Self {
			e,
			e2,
			qp,
			rq,
			d,
			sin_b1: b1.sin(),
			cos_b1: b1.cos(),
			lon0: LON_ORIGIN.to_radians(),
			lat0,
			false_easting: FALSE_EASTING,
			false_northing: FALSE_NORTHING,
		}
	}

	fn forward(&self, c: Coord<f64>) -> Result<Coord<f64>> {
		if !(-90.0..=90.0).contains(&c.y) {
			bail!("latitude out of range: {}", c.y);
		}

		let lam = c.x.to_radians() - self.lon0;
		let b = (authalic_q(c.y.to_radians(), self.e, self.e2) / self.qp)
			.clamp(-1.0, 1.0)
			.asin();

		let denom = 1.0 + self.sin_b1 * b.sin() + self.cos_b1 * b.cos() * lam.cos();
		if denom < 1e-12 {
			bail!("point ({}, {}) is antipodal to the projection origin", c.x, c.y);
		}

		let big_b = self.rq * (2.0 / denom).sqrt();
		let x = big_b * self.d * b.cos() * lam.sin();
		let y = (big_b / self.d) * (self.cos_b1 * b.sin() - self.sin_b1 * b.cos() * lam.cos());

		Ok(Coord {
			x: self.false_easting + x,
			y: self.false_northing + y,
		})
	}

	fn inverse(&self, c: Coord<f64>) -> Result<Coord<f64>> {
		let x = c.x - self.false_easting;
		let y = c.y - self.false_northing;

		let rho = ((x / self.d).powi(2) + (self.d * y).powi(2)).sqrt();
		if rho == 0.0 {
			return Ok(Coord {
				x: self.lon0.to_degrees(),
				y: self.lat0.to_degrees(),
			});
		}

		let ratio = rho / (2.0 * self.rq);
		if ratio > 1.0 {
			bail!("point ({}, {}) is outside the projected domain", c.x, c.y);
		}

		let ce = 2.0 * ratio.asin();
		let (sin_ce, cos_ce) = ce.sin_cos();
		let beta = (cos_ce * self.sin_b1 + self.d * y * sin_ce * self.cos_b1 / rho)
			.clamp(-1.0, 1.0)
			.asin();
		let lam = self.lon0
			+ (x * sin_ce).atan2(
				self.d * rho * self.cos_b1 * cos_ce - self.d.powi(2) * y * self.sin_b1 * sin_ce,
			);

		let e4 = self.e2 * self.e2;
		let e6 = e4 * self.e2;
		let phi = beta
			+ (self.e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
			+ (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
			+ (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

		Ok(Coord {
			x: normalise_lon(lam.to_degrees()),
			y: phi.to_degrees(),
		})
	}
}

fn authalic_q(phi: f64, e: f64, e2: f64) -> f64 {
	let s = phi.sin();
	(1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

fn normalise_lon(lon: f64) -> f64 {
	let mut lon = lon;
	while lon > 180.0 {
		lon -= 360.0;
	}
	while lon < -180.0 {
		lon += 360.0;
	}
	lon
}

/// Reprojects a geometry, returning a new value in the target CRS.
pub fn reproject(geometry: &MultiPolygon<f64>, from: Crs, to: Crs) -> Result<MultiPolygon<f64>> {
	if from == to {
		return Ok(geometry.clone());
	}

	debug!(%from, %to, polygons=%geometry.0.len(), "reprojecting geometry");
	let laea = Laea::epsg3035();
	match (from, to) {
		(Crs::Wgs84, Crs::Laea3035) => geometry.try_map_coords(|c| laea.forward(c)),
		_ => geometry.try_map_coords(|c| laea.inverse(c)),
	}
}

#[cfg(test)]
mod tests {
	use geo::{polygon, Area};

	use super::*;

	#[test]
	fn epsg_guidance_example_point() {
		// IOGP guidance note 7-2, example for EPSG:3035
		let c = Laea::epsg3035().forward(Coord { x: 5.0, y: 50.0 }).unwrap();
		assert!((c.x - 3_962_799.45).abs() < 0.01, "easting {}", c.x);
		assert!((c.y - 2_999_718.85).abs() < 0.01, "northing {}", c.y);
	}

	#[test]
	fn origin_maps_to_false_origin() {
		let c = Laea::epsg3035().forward(Coord { x: 10.0, y: 52.0 }).unwrap();
		assert!((c.x - FALSE_EASTING).abs() < 1e-6);
		assert!((c.y - FALSE_NORTHING).abs() < 1e-6);

		let back = Laea::epsg3035().inverse(c).unwrap();
		assert!((back.x - 10.0).abs() < 1e-9);
		assert!((back.y - 52.0).abs() < 1e-9);
	}

	#[test]
	fn round_trip_preserves_shape() {
		let square = MultiPolygon(vec![polygon![
			(x: -60.0, y: -10.0),
			(x: -55.0, y: -10.0),
			(x: -55.0, y: -5.0),
			(x: -60.0, y: -5.0),
			(x: -60.0, y: -10.0),
		]]);

		let projected = reproject(&square, Crs::Wgs84, Crs::Laea3035).unwrap();
		let back = reproject(&projected, Crs::Laea3035, Crs::Wgs84).unwrap();

		let before = square.0[0].exterior().0.clone();
		let after = back.0[0].exterior().0.clone();
		assert_eq!(before.len(), after.len());
		for (a, b) in before.iter().zip(after.iter()) {
			assert!((a.x - b.x).abs() < 1e-6, "{:?} vs {:?}", a, b);
			assert!((a.y - b.y).abs() < 1e-6, "{:?} vs {:?}", a, b);
		}
		assert!(back.unsigned_area() > 0.0);
	}

	#[test]
	fn one_degree_cell_at_equator_has_ellipsoidal_area() {
		let cell = MultiPolygon(vec![polygon![
			(x: -60.0, y: 0.0),
			(x: -59.0, y: 0.0),
			(x: -59.0, y: 1.0),
			(x: -60.0, y: 1.0),
			(x: -60.0, y: 0.0),
		]]);

		let km2 = reproject(&cell, Crs::Wgs84, Crs::Laea3035).unwrap().unsigned_area() / 1e6;
		// exact area on GRS80 is 12 308.46 km²; straight edges lose a little
		assert!((km2 - 12_308.46).abs() / 12_308.46 < 1e-3, "area {}", km2);
	}

	#[test]
	fn antipode_is_rejected() {
		let err = Laea::epsg3035().forward(Coord { x: -170.0, y: -52.0 });
		assert!(err.is_err());
	}

	#[test]
	fn same_crs_is_identity() {
		let mp = MultiPolygon(vec![polygon![(x: 1.5, y: 2.5), (x: 2.0, y: 2.5), (x: 2.0, y: 3.0), (x: 1.5, y: 2.5)]]);
		assert_eq!(reproject(&mp, Crs::Wgs84, Crs::Wgs84).unwrap(), mp);
	}

	#[test]
	fn parses_and_detects() {
		assert_eq!("EPSG:3035".parse::<Crs>().unwrap(), Crs::Laea3035);
		assert_eq!("4326".parse::<Crs>().unwrap(), Crs::Wgs84);
		assert!("epsg:32630".parse::<Crs>().is_err());

		let wgs = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
		assert_eq!(Crs::from_wkt(wgs).unwrap(), Crs::Wgs84);

		let utm = r#"PROJCS["WGS_1984_UTM_Zone_30N",GEOGCS["GCS_WGS_1984"],PROJECTION["Transverse_Mercator"]]"#;
		assert!(Crs::from_wkt(utm).is_err());

		assert!(Crs::Laea3035.is_equal_area());
		assert!(!Crs::Wgs84.is_equal_area());
	}
}

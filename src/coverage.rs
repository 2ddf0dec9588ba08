use color_eyre::eyre::{bail, Result};
use geo::{Area, BooleanOps, BoundingRect, Intersects};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::region::Region;

const M2_PER_KM2: f64 = 1e6;

/// Protected-area coverage of one country. Areas in km².
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoverageResult {
	pub name: String,
	pub protected_area_total: f64,
	pub area_total: f64,
	/// `None` when the country has no area.
	pub protected_area_fraction: Option<f64>,
	pub non_protected_area_total: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Coverage {
	pub countries: Vec<CoverageResult>,
}

impl Coverage {
	pub fn protected_total(&self) -> f64 {
		self.countries.iter().map(|c| c.protected_area_total).sum()
	}

	pub fn area_total(&self) -> f64 {
		self.countries.iter().map(|c| c.area_total).sum()
	}

	/// Protected fraction across all countries combined.
	pub fn global_fraction(&self) -> Option<f64> {
		fraction(self.protected_total(), self.area_total())
	}

	/// A country's share of the protected area of all countries.
	pub fn share(&self, name: &str) -> Option<f64> {
		let country = self.countries.iter().find(|c| c.name == name)?;
		fraction(country.protected_area_total, self.protected_total())
	}

	/// Countries sorted ascending by `key`; countries without a value sort first.
	pub fn sorted_by(&self, key: impl Fn(&CoverageResult) -> Option<f64>) -> Vec<&CoverageResult> {
		let mut sorted: Vec<&CoverageResult> = self.countries.iter().collect();
		sorted.sort_by(|a, b| {
			key(a)
				.unwrap_or(f64::NEG_INFINITY)
				.total_cmp(&key(b).unwrap_or(f64::NEG_INFINITY))
		});
		sorted
	}
}

fn fraction(part: f64, whole: f64) -> Option<f64> {
	if whole == 0.0 {
		None
	} else {
		Some(part / whole)
	}
}

/// Computes per-country protected-area coverage.
///
/// The protected area of a country is the *sum* of its intersections with
/// each protected polygon, so protected areas that overlap each other are
/// counted once per overlap. The protected total can therefore exceed the
/// country's area.
///
/// All regions must share one equal-area CRS.
pub fn aggregate(countries: &[Region], protected: &[Region]) -> Result<Coverage> {
	let Some(crs) = countries.first().or(protected.first()).map(|r| r.crs) else {
		return Ok(Coverage::default());
	};

	if let Some(r) = countries.iter().chain(protected).find(|r| r.crs != crs) {
		bail!("region {:?} is in {}, expected {}", r.name, r.crs, crs);
	}

	if !crs.is_equal_area() {
		bail!("{} is not an equal-area CRS, reproject before computing areas", crs);
	}

	info!(countries=%countries.len(), protected=%protected.len(), %crs, "computing protected area coverage");

	let protected_bounds: Vec<_> = protected.iter().map(|p| p.geometry.bounding_rect()).collect();

	let mut results = Vec::with_capacity(countries.len());
	for country in countries {
		let country_m2 = country.geometry.unsigned_area();
		let bounds = country.geometry.bounding_rect().filter(|_| country_m2 > 0.0);
		let mut overlaps = 0_usize;

		let protected_m2: f64 = protected
			.iter()
			.zip(&protected_bounds)
			.filter(|(_, pb)| match (bounds, pb) {
				(Some(a), Some(b)) => a.intersects(b),
				_ => false,
			})
			.map(|(p, _)| {
				let area = country.geometry.intersection(&p.geometry).unsigned_area();
				if area > 0.0 {
					overlaps += 1;
					trace!(country=%country.name, protected=%p.name, %area, "intersection");
				}
				area
			})
			.sum();

		let protected_area_total = protected_m2 / M2_PER_KM2;
		let area_total = country_m2 / M2_PER_KM2;

		debug!(
			country=%country.name,
			%overlaps,
			protected=%protected_area_total,
			total=%area_total,
			"country coverage"
		);

		results.push(CoverageResult {
			name: country.name.clone(),
			protected_area_total,
			area_total,
			protected_area_fraction: fraction(protected_area_total, area_total),
			non_protected_area_total: area_total - protected_area_total,
		});
	}

	Ok(Coverage { countries: results })
}

#[cfg(test)]
mod tests {
	use geo::{polygon, MultiPolygon, Polygon};
	use geojson::JsonObject;

	use super::*;
	use crate::crs::Crs;

	const KM: f64 = 1000.0;

	fn square(name: &str, x: f64, y: f64, side_km: f64) -> Region {
		let s = side_km * KM;
		let (x, y) = (x * KM, y * KM);
		let p: Polygon<f64> = polygon![
			(x: x, y: y),
			(x: x + s, y: y),
			(x: x + s, y: y + s),
			(x: x, y: y + s),
			(x: x, y: y),
		];
		Region {
			name: name.into(),
			geometry: MultiPolygon(vec![p]),
			crs: Crs::Laea3035,
			attributes: JsonObject::new(),
		}
	}

	#[test]
	fn fully_covered_and_uncovered_countries() {
		let countries = vec![square("covered", 0.0, 0.0, 1.0), square("bare", 10.0, 0.0, 1.0)];
		let protected = vec![square("park", -1.0, -1.0, 3.0), square("far away", 50.0, 50.0, 1.0)];

		let coverage = aggregate(&countries, &protected).unwrap();
		assert_eq!(coverage.countries.len(), 2);

		let covered = &coverage.countries[0];
		assert!((covered.area_total - 1.0).abs() < 1e-9);
		assert!((covered.protected_area_fraction.unwrap() - 1.0).abs() < 1e-9);

		let bare = &coverage.countries[1];
		assert_eq!(bare.protected_area_total, 0.0);
		assert_eq!(bare.protected_area_fraction, Some(0.0));
	}

	#[test]
	fn partial_coverage() {
		let countries = vec![square("country", 0.0, 0.0, 2.0)];
		let protected = vec![square("half", 1.0, -1.0, 4.0)];

		let c = &aggregate(&countries, &protected).unwrap().countries[0];
		assert!((c.area_total - 4.0).abs() < 1e-9);
		assert!((c.protected_area_total - 2.0).abs() < 1e-9);
		assert!((c.protected_area_fraction.unwrap() - 0.5).abs() < 1e-9);
	}

	#[test]
	fn overlapping_protected_areas_are_counted_twice() {
		let countries = vec![square("country", 0.0, 0.0, 1.0)];
		let protected = vec![square("a", -1.0, -1.0, 3.0), square("b", -0.5, -0.5, 2.0)];

		let c = &aggregate(&countries, &protected).unwrap().countries[0];
		assert!((c.protected_area_total - 2.0).abs() < 1e-9);
		assert!(c.protected_area_total > c.area_total);
		assert!((c.protected_area_fraction.unwrap() - 2.0).abs() < 1e-9);
		assert!((c.non_protected_area_total + 1.0).abs() < 1e-9);
	}

	#[test]
	fn totals_add_up() {
		let countries = vec![
			square("a", 0.0, 0.0, 3.0),
			square("b", 5.0, 0.0, 2.0),
			square("c", 0.0, 5.0, 1.5),
		];
		let protected = vec![
			square("p1", 1.0, 1.0, 1.0),
			square("p2", 4.0, 0.5, 2.0),
			square("p3", 0.5, 5.5, 0.5),
		];

		let coverage = aggregate(&countries, &protected).unwrap();
		for c in &coverage.countries {
			let sum = c.protected_area_total + c.non_protected_area_total;
			assert!((sum - c.area_total).abs() <= 1e-12 * c.area_total, "{}: {} vs {}", c.name, sum, c.area_total);
		}

		let independent = coverage.countries.iter().map(|c| c.protected_area_total).sum::<f64>()
			/ coverage.countries.iter().map(|c| c.area_total).sum::<f64>();
		assert_eq!(coverage.global_fraction(), Some(independent));

		let shares: f64 = ["a", "b", "c"].iter().filter_map(|n| coverage.share(n)).sum();
		assert!((shares - 1.0).abs() < 1e-9);
		assert_eq!(coverage.share("nowhere"), None);
	}

	#[test]
	fn zero_area_country_has_no_fraction() {
		let countries = vec![square("flat", 0.0, 0.0, 0.0)];
		let protected = vec![square("park", 0.0, 0.0, 1.0)];

		let coverage = aggregate(&countries, &protected).unwrap();
		assert_eq!(coverage.countries[0].protected_area_fraction, None);
		assert_eq!(coverage.global_fraction(), None);
	}

	#[test]
	fn sorts_ascending() {
		let countries = vec![square("big", 0.0, 0.0, 2.0), square("small", 5.0, 0.0, 1.0)];
		let protected = vec![square("p", -1.0, -1.0, 4.0), square("q", 5.25, 0.25, 0.5)];

		let coverage = aggregate(&countries, &protected).unwrap();
		let names: Vec<_> = coverage
			.sorted_by(|c| c.protected_area_fraction)
			.into_iter()
			.map(|c| c.name.as_str())
			.collect();
		assert_eq!(names, vec!["small", "big"]);
	}

	#[test]
	fn rejects_degrees_and_mixed_crs() {
		let mut degrees = square("deg", 0.0, 0.0, 1.0);
		degrees.crs = Crs::Wgs84;
		assert!(aggregate(&[degrees.clone()], &[degrees.clone()]).is_err());
		assert!(aggregate(&[square("m", 0.0, 0.0, 1.0)], &[degrees]).is_err());
	}

	#[test]
	fn nothing_in_nothing_out() {
		assert_eq!(aggregate(&[], &[]).unwrap(), Coverage::default());
	}
}

use std::fmt::Write;

use color_eyre::eyre::Result;
use itertools::Itertools;

use crate::{coverage::Coverage, region::ReportedArea};

fn percent(f: Option<f64>) -> String {
	f.map(|f| format!("{:5.1}%", f * 100.0))
		.unwrap_or_else(|| "    -".into())
}

/// Plain-text report of the coverage, most protected country first.
pub fn text(coverage: &Coverage, reported: &ReportedArea, highlight: &str) -> Result<String> {
	let mut message = String::with_capacity(coverage.countries.len() * 80 + 256);

	writeln!(message, "total protected area {:.4e} [km^2]", reported.land_km2)?;
	let reported_fraction = (coverage.area_total() > 0.0).then(|| reported.land_km2 / coverage.area_total());
	writeln!(message, "protected land fraction (reported) {}", percent(reported_fraction).trim())?;
	writeln!(message, "protected land fraction (computed) {}", percent(coverage.global_fraction()).trim())?;
	writeln!(message)?;

	let width = coverage
		.countries
		.iter()
		.map(|c| c.name.chars().count())
		.max()
		.unwrap_or(0)
		.max("country".len());

	writeln!(
		message,
		"{:width$}  {:>14}  {:>14}  {:>8}",
		"country",
		"protected km²",
		"total km²",
		"fraction",
		width = width
	)?;

	let rows = coverage
		.sorted_by(|c| c.protected_area_fraction)
		.into_iter()
		.rev()
		.map(|c| {
			format!(
				"{:width$}  {:>14.0}  {:>14.0}  {:>8}",
				c.name,
				c.protected_area_total,
				c.area_total,
				percent(c.protected_area_fraction),
				width = width
			)
		})
		.join("\n");
	writeln!(message, "{}", rows)?;

	if let Some(share) = coverage.share(highlight) {
		writeln!(message)?;
		writeln!(message, "{} holds {} of the protected area", highlight, percent(Some(share)).trim())?;
	}

	Ok(message.trim_end().into())
}

use std::{env::var, path::PathBuf};

use color_eyre::eyre::Result;
use serde::Serialize;
use structopt::StructOpt;
use tracing::{debug, info, warn};

use coverage::Coverage;
use crs::Crs;
use region::ReportedArea;
use render::{BarChart, BarTrace, MapDocument, OutputFormat, RegionStyle};

mod coverage;
mod crs;
mod fetch;
mod region;
mod render;
mod track;

#[derive(Clone, Debug, StructOpt)]
struct Args {
	#[structopt(short, parse(from_occurrences))]
	verbose: u8,

	#[structopt(short, long)]
	quiet: bool,

	/// Course data directory; other input paths are relative to it
	#[structopt(long, default_value = "../input/geospatial-learn-course-data/")]
	data_dir: PathBuf,

	#[structopt(long, default_value = "purple_martin.csv")]
	birds: PathBuf,

	/// Country boundaries (shapefile, GeoJSON, or a directory of them)
	#[structopt(long, default_value = "naturalearth_lowres/naturalearth_lowres.shp")]
	world: PathBuf,

	/// Protected area boundaries (shapefile, GeoJSON, or a directory of them)
	#[structopt(
		long,
		default_value = "SAPA_Aug2019-shapefile/SAPA_Aug2019-shapefile/SAPA_Aug2019-shapefile-polygons.shp"
	)]
	protected: PathBuf,

	#[structopt(long, default_value = ".")]
	out_dir: PathBuf,

	#[structopt(long, default_value = "5")]
	zoom: u8,

	#[structopt(long, default_value = "OpenStreetMap")]
	tiles: String,

	/// Tile set for the final overlay map
	#[structopt(long, default_value = "Stamen Terrain")]
	overlay_tiles: String,

	/// Simplification tolerance for protected area outlines, in degrees
	#[structopt(long, default_value = "0.02")]
	simplify: f64,

	/// Equal-area CRS used for area computations
	#[structopt(long, default_value = "EPSG:3035")]
	area_crs: Crs,

	/// Country whose share of the protected area is reported
	#[structopt(long, default_value = "Brazil")]
	highlight: String,

	/// Fail instead of fetching the dataset with the kaggle CLI when the data directory is missing
	#[structopt(long)]
	no_download: bool,

	/// Kaggle dataset id to download from
	#[structopt(long)]
	dataset: Option<String>,

	/// Open every written artifact in the default viewer
	#[structopt(long)]
	open: bool,

	#[structopt(long, default_value = "text")]
	output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
	coverage: &'a Coverage,
	global_fraction: Option<f64>,
	reported: &'a ReportedArea,
	artifacts: &'a [PathBuf],
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	if var("RUST_LOG").is_ok() {
		tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.init();
	}

	let args = Args::from_args();

	if !args.quiet {
		tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.with_env_filter(match args.verbose {
				0 => "birdcover=info",
				1 => "birdcover=debug",
				2 => "birdcover=trace",
				3.. => "trace",
			})
			.try_init()
			.ok();
	}

	debug!(?args, "parsed arguments");

	if !args.area_crs.is_equal_area() {
		warn!(crs=%args.area_crs, "area CRS is not equal-area, coverage will be refused");
	}

	let dataset = args.dataset.as_deref().unwrap_or(fetch::DEFAULT_DATASET);
	fetch::ensure_dataset(&args.data_dir, dataset, !args.no_download).await?;

	info!("loading tracking records and boundaries");
	let (points, world, protected) = futures::try_join!(
		track::load_tracks(args.data_dir.join(&args.birds)),
		region::load_regions(args.data_dir.join(&args.world), "name"),
		region::load_regions(args.data_dir.join(&args.protected), "NAME"),
	)?;

	let tracks = track::group_tracks(&points);
	for ((bird, readings), track) in track::summary(&tracks).into_iter().zip(&tracks) {
		debug!(
			%bird,
			%readings,
			start=?track.start().map(|p| p.timestamp),
			end=?track.end().map(|p| p.timestamp),
			"track"
		);
	}
	info!(birds=%tracks.len(), points=%points.len(), "grouped tracks");

	let americas = region::filter_by_attr(&world, "continent", &["North America", "South America"]);
	let south_america = region::filter_by_attr(&world, "continent", &["South America"]);
	info!(americas=%americas.len(), south_america=%south_america.len(), "selected countries");

	let reported = region::reported_land_area(&protected);
	let protected = region::simplify(&protected, args.simplify);
	let protected_on_land = region::land_only(&protected);

	let center = track::center(&points)?;
	let mut artifacts = Vec::new();

	let mut m1 = MapDocument::new("Purple martin migration", center, args.zoom, &args.tiles)?;
	m1.add_regions(&americas, RegionStyle::outline())?.add_tracks(&tracks);
	artifacts.push(render::write_html(&args.out_dir, "m_1.html", &m1.to_html())?);

	let mut m2 = MapDocument::new("Protected areas", center, args.zoom, &args.tiles)?;
	m2.add_regions(&protected, RegionStyle::filled("coral"))?;
	artifacts.push(render::write_html(&args.out_dir, "m_2.html", &m2.to_html())?);

	let mut m3 = MapDocument::new("Migration over protected land", center, args.zoom, &args.overlay_tiles)?;
	m3.add_regions(&protected_on_land, RegionStyle::filled("coral"))?
		.add_tracks(&tracks);
	artifacts.push(render::write_html(&args.out_dir, "m_3.html", &m3.to_html())?);

	info!(crs=%args.area_crs, "reprojecting for area computation");
	let countries = region::reproject_all(&south_america, args.area_crs)?;
	let protected_on_land = region::reproject_all(&protected_on_land, args.area_crs)?;
	let coverage = coverage::aggregate(&countries, &protected_on_land)?;

	let by_fraction = coverage.sorted_by(|c| c.protected_area_fraction);
	let mut p1 = BarChart::new("Fraction of protected area", "Fraction of Protected Area").trace(BarTrace {
		name: None,
		y: by_fraction.iter().map(|c| c.name.clone()).collect(),
		x: by_fraction
			.iter()
			.map(|c| c.protected_area_fraction.unwrap_or(0.0))
			.collect(),
	});
	if let Some(fraction) = coverage.global_fraction() {
		p1 = p1.vline(fraction);
	}
	artifacts.push(render::write_html(&args.out_dir, "p_1.html", &p1.to_html())?);

	let by_protected = coverage.sorted_by(|c| Some(c.protected_area_total));
	let names: Vec<String> = by_protected.iter().map(|c| c.name.clone()).collect();
	let p2 = BarChart::new("Area use", "Area Use [km^2]")
		.trace(BarTrace {
			name: Some("protected".into()),
			y: names.clone(),
			x: by_protected.iter().map(|c| c.protected_area_total).collect(),
		})
		.trace(BarTrace {
			name: Some("not protected".into()),
			y: names,
			x: by_protected.iter().map(|c| c.non_protected_area_total).collect(),
		})
		.stacked();
	artifacts.push(render::write_html(&args.out_dir, "p_2.html", &p2.to_html())?);

	match args.output {
		OutputFormat::Json => {
			serde_json::to_writer(
				std::io::stdout(),
				&Report {
					coverage: &coverage,
					global_fraction: coverage.global_fraction(),
					reported: &reported,
					artifacts: &artifacts,
				},
			)?;
			println!();
		}
		OutputFormat::Text => {
			println!("{}", render::text(&coverage, &reported, &args.highlight)?);
		}
	}

	if args.open {
		for path in &artifacts {
			render::open_in_viewer(path)?;
		}
	}

	Ok(())
}

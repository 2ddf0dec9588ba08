use color_eyre::eyre::{bail, Result};
use geojson::{Feature, FeatureCollection, Geometry};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{escape_html, script_json, track_colour};
use crate::{crs::Crs, region::Region, track::Track};

const OSM_TILES: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const TERRAIN_TILES: &str = "https://tiles.stadiamaps.com/tiles/stamen_terrain/{z}/{x}/{y}.png";
const TONER_TILES: &str = "https://tiles.stadiamaps.com/tiles/stamen_toner/{z}/{x}/{y}.png";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionStyle {
	#[serde(rename = "fillColor", skip_serializing_if = "Option::is_none")]
	pub fill_colour: Option<String>,
	pub stroke: bool,
}

impl RegionStyle {
	/// Outlined boundaries with the default fill.
	pub fn outline() -> Self {
		Self {
			fill_colour: None,
			stroke: true,
		}
	}

	/// Filled areas without borders.
	pub fn filled(colour: &str) -> Self {
		Self {
			fill_colour: Some(colour.into()),
			stroke: false,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Layer {
	Regions {
		data: FeatureCollection,
		style: RegionStyle,
	},
	Track {
		bird: String,
		colour: String,
		/// `[lat, lon]` pairs, the order Leaflet expects
		points: Vec<[f64; 2]>,
	},
}

/// An interactive Leaflet map written as one self-contained HTML file.
#[derive(Clone, Debug)]
pub struct MapDocument {
	title: String,
	center: (f64, f64),
	zoom: u8,
	tiles: String,
	layers: Vec<Layer>,
}

impl MapDocument {
	/// `center` is `(lat, lon)`. `tiles` is a known tile set name or a URL template.
	pub fn new(title: &str, center: (f64, f64), zoom: u8, tiles: &str) -> Result<Self> {
		Ok(Self {
			title: title.into(),
			center,
			zoom,
			tiles: tile_url(tiles)?,
			layers: Vec::new(),
		})
	}

	pub fn add_regions(&mut self, regions: &[Region], style: RegionStyle) -> Result<&mut Self> {
		let mut features = Vec::with_capacity(regions.len());
		for region in regions {
			let region = if region.crs == Crs::Wgs84 {
				region.clone()
			} else {
				region.to_crs(Crs::Wgs84)?
			};

			let mut properties = region.attributes;
			properties.insert("name".into(), region.name.into());
			features.push(Feature {
				geometry: Some(Geometry::new(geojson::Value::from(&region.geometry))),
				properties: Some(properties),
				..Default::default()
			});
		}

		debug!(title=%self.title, features=%features.len(), "adding region layer");
		self.layers.push(Layer::Regions {
			data: FeatureCollection {
				features,
				bbox: None,
				foreign_members: None,
			},
			style,
		});
		Ok(self)
	}

	/// One polyline plus a circle marker per reading, one colour per track.
	/// Colours follow the slice order, so pass tracks in the same order to
	/// every map.
	pub fn add_tracks(&mut self, tracks: &[Track]) -> &mut Self {
		for (index, track) in tracks.iter().enumerate() {
			self.layers.push(Layer::Track {
				bird: track.bird_id.clone(),
				colour: track_colour(index),
				points: track.line().coords().map(|c| [c.y, c.x]).collect(),
			});
		}

		debug!(title=%self.title, tracks=%tracks.len(), "adding track layers");
		self
	}

	fn layer_count(&self) -> usize {
		self.layers.len()
	}

	pub fn to_html(&self) -> String {
		debug!(title=%self.title, layers=%self.layer_count(), "rendering map");
		let config = json!({
			"center": [self.center.0, self.center.1],
			"zoom": self.zoom,
			"tiles": self.tiles,
			"layers": self.layers,
		});

		MAP_TEMPLATE
			.replace("{{title}}", &escape_html(&self.title))
			.replace("{{config}}", &script_json(&config))
	}
}

fn tile_url(tiles: &str) -> Result<String> {
	match tiles.to_lowercase().as_str() {
		"openstreetmap" | "osm" => Ok(OSM_TILES.into()),
		"stamen terrain" | "terrain" => Ok(TERRAIN_TILES.into()),
		"stamen toner" | "toner" => Ok(TONER_TILES.into()),
		_ if tiles.contains("{z}") && tiles.contains("{x}") && tiles.contains("{y}") => Ok(tiles.into()),
		_ => bail!("unknown tile set: {}", tiles),
	}
}

const MAP_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{title}}</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
  <style>
    html, body, #map { height: 100%; width: 100%; margin: 0; padding: 0; }
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
    const config = {{config}};
    const map = L.map("map").setView(config.center, config.zoom);
    L.tileLayer(config.tiles, {
      maxZoom: 18,
      attribution: "&copy; OpenStreetMap contributors",
    }).addTo(map);

    for (const layer of config.layers) {
      if (layer.kind === "regions") {
        L.geoJSON(layer.data, {
          style: () => layer.style,
          onEachFeature: (feature, l) => l.bindTooltip(String(feature.properties.name)),
        }).addTo(map);
      } else if (layer.kind === "track") {
        L.polyline(layer.points, { weight: 2, opacity: 1.0, color: layer.colour })
          .bindTooltip(layer.bird)
          .addTo(map);
        for (const point of layer.points) {
          L.circleMarker(point, {
            radius: 8,
            color: "transparent",
            fill: true,
            fillColor: layer.colour,
            fillOpacity: 0.7,
          }).addTo(map);
        }
      }
    }
  </script>
</body>
</html>
"#;

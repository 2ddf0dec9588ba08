use std::{
	path::{Path, PathBuf},
	str::FromStr,
};

use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

pub use chart::{BarChart, BarTrace};
pub use map::{MapDocument, RegionStyle};
pub use text::text;

mod chart;
mod map;
mod text;

/// How the coverage summary is printed on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
	Json,
	Text,
}

impl FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"json" => Ok(Self::Json),
			"text" => Ok(Self::Text),
			_ => Err(format!("unknown output type: {}", s)),
		}
	}
}

const PALETTE: [&str; 12] = [
	"#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6",
	"#bfef45", "#469990", "#9a6324", "#800000",
];

/// Colour of the `index`th track. Past the palette, hues are spread by the
/// golden angle so neighbouring indices stay apart.
pub fn track_colour(index: usize) -> String {
	match PALETTE.get(index) {
		Some(colour) => (*colour).to_string(),
		None => {
			let hue = (index as f64 * 137.508) % 360.0;
			format!("hsl({:.1}, 70%, 45%)", hue)
		}
	}
}

/// Embeds a JSON document inside a `<script>` element.
pub(crate) fn script_json(value: &serde_json::Value) -> String {
	value.to_string().replace("</", "<\\/")
}

pub(crate) fn escape_html(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
		.replace('"', "&quot;")
}

/// Writes an HTML artifact into `dir` and returns its absolute path.
pub fn write_html(dir: &Path, file_name: &str, html: &str) -> Result<PathBuf> {
	std::fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
	let path = dir.join(file_name);
	std::fs::write(&path, html).wrap_err_with(|| format!("writing {}", path.display()))?;

	let path = path.canonicalize()?;
	info!(url=%file_url(&path), bytes=%html.len(), "wrote artifact");
	Ok(path)
}

pub fn file_url(path: &Path) -> String {
	format!("file://{}", path.display())
}

/// Hands a written artifact to the platform's default viewer.
pub fn open_in_viewer(path: &Path) -> Result<()> {
	let opener = if cfg!(target_os = "macos") {
		"open"
	} else if cfg!(target_os = "windows") {
		"explorer"
	} else {
		"xdg-open"
	};

	debug!(?path, %opener, "opening artifact");
	let status = std::process::Command::new(opener)
		.arg(path)
		.status()
		.wrap_err_with(|| format!("running {}", opener))?;

	if !status.success() {
		warn!(?path, %status, "viewer exited unsuccessfully");
		return Err(eyre!("{} failed to open {}", opener, path.display()));
	}

	Ok(())
}

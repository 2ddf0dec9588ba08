use serde::Serialize;
use serde_json::json;

use super::{escape_html, script_json};

/// One horizontal bar series: `y` holds the category labels, `x` the lengths.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BarTrace {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub y: Vec<String>,
	pub x: Vec<f64>,
}

/// A horizontal bar chart rendered with Plotly.
#[derive(Clone, Debug)]
pub struct BarChart {
	pub title: String,
	pub traces: Vec<BarTrace>,
	pub stacked: bool,
	pub x_title: String,
	pub width: u32,
	pub height: u32,
	pub font_size: u32,
	/// Vertical reference line at this x value.
	pub vline: Option<f64>,
}

impl BarChart {
	pub fn new(title: &str, x_title: &str) -> Self {
		Self {
			title: title.into(),
			traces: Vec::new(),
			stacked: false,
			x_title: x_title.into(),
			width: 1024,
			height: 512,
			font_size: 20,
			vline: None,
		}
	}

	pub fn trace(mut self, trace: BarTrace) -> Self {
		self.traces.push(trace);
		self
	}

	pub fn stacked(mut self) -> Self {
		self.stacked = true;
		self
	}

	pub fn vline(mut self, x: f64) -> Self {
		self.vline = Some(x);
		self
	}

	fn figure(&self) -> serde_json::Value {
		let data: Vec<_> = self
			.traces
			.iter()
			.map(|t| {
				let mut v = json!({
					"type": "bar",
					"orientation": "h",
					"y": t.y,
					"x": t.x,
				});
				if let Some(name) = &t.name {
					v["name"] = json!(name);
				}
				v
			})
			.collect();

		let mut layout = json!({
			"height": self.height,
			"width": self.width,
			"font": { "size": self.font_size },
			"xaxis": { "title": { "text": self.x_title } },
		});
		if self.stacked {
			layout["barmode"] = json!("stack");
		}
		if let Some(x) = self.vline {
			layout["shapes"] = json!([{
				"type": "line",
				"xref": "x",
				"yref": "paper",
				"x0": x,
				"x1": x,
				"y0": 0,
				"y1": 1,
			}]);
		}

		json!({ "data": data, "layout": layout })
	}

	pub fn to_html(&self) -> String {
		CHART_TEMPLATE
			.replace("{{title}}", &escape_html(&self.title))
			.replace("{{figure}}", &script_json(&self.figure()))
	}
}

const CHART_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <title>{{title}}</title>
  <script src="https://cdn.plot.ly/plotly-2.35.2.min.js" charset="utf-8"></script>
</head>
<body>
  <div id="chart"></div>
  <script>
    const figure = {{figure}};
    Plotly.newPlot("chart", figure.data, figure.layout);
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
	use super::*;

	fn trace(name: Option<&str>) -> BarTrace {
		BarTrace {
			name: name.map(Into::into),
			y: vec!["Chile".into(), "Brazil".into()],
			x: vec![0.2, 0.4],
		}
	}

	#[test]
	fn fraction_chart_has_reference_line() {
		let chart = BarChart::new("p_1", "Fraction of Protected Area")
			.trace(trace(None))
			.vline(0.31);
		let fig = chart.figure();

		assert_eq!(fig["data"][0]["orientation"], "h");
		assert_eq!(fig["data"][0]["y"][1], "Brazil");
		assert!(fig["data"][0].get("name").is_none());
		assert_eq!(fig["layout"]["shapes"][0]["x0"], 0.31);
		assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "Fraction of Protected Area");
		assert!(fig["layout"].get("barmode").is_none());
	}

	#[test]
	fn stacked_chart() {
		let chart = BarChart::new("p_2", "Area Use [km^2]")
			.trace(trace(Some("protected")))
			.trace(trace(Some("not protected")))
			.stacked();
		let fig = chart.figure();

		assert_eq!(fig["data"].as_array().unwrap().len(), 2);
		assert_eq!(fig["data"][1]["name"], "not protected");
		assert_eq!(fig["layout"]["barmode"], "stack");
		assert_eq!(fig["layout"]["width"], 1024);

		let html = chart.to_html();
		assert!(html.contains("<title>p_2</title>"));
		assert!(html.contains("Plotly.newPlot"));
		assert!(!html.contains("{{figure}}"));
	}
}

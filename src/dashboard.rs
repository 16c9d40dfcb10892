//! Random pie chart dashboard.
//!
//! A single page with an "Update Charts" button and three pie charts of five
//! slices each. Every request draws new values; nothing is read from the CSV
//! logs. Charts are rendered server-side as inline SVG so the page needs no
//! scripts.

use axum::{Json, Router, extract::Query, response::Html, routing::get};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt::Write;

pub const LABELS: [&str; 5] = ["A", "B", "C", "D", "E"];
pub const CHART_COUNT: usize = 3;
pub const MAX_VALUE: u32 = 100;

/// Fraction of the radius each slice is pulled out from the centre.
const PULL: f64 = 0.1;
const CHART_SIZE: f64 = 330.0;
const PALETTE: [&str; 5] = ["#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub label: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieChart {
    pub name: String,
    pub slices: Vec<Slice>,
}

impl PieChart {
    pub fn total(&self) -> u32 {
        self.slices.iter().map(|s| s.value).sum()
    }
}

/// Three charts, values uniformly drawn from 1..=100.
pub fn random_charts<R: Rng>(rng: &mut R) -> Vec<PieChart> {
    (1..=CHART_COUNT)
        .map(|n| PieChart {
            name: format!("Chart {}", n),
            slices: LABELS
                .iter()
                .map(|label| Slice {
                    label: label.to_string(),
                    value: rng.random_range(1..=MAX_VALUE),
                })
                .collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn polar(cx: f64, cy: f64, r: f64, angle: f64) -> (f64, f64) {
    (cx + r * angle.cos(), cy + r * angle.sin())
}

/// One pie as an SVG element. Slices start at 12 o'clock and run clockwise.
pub fn render_svg(chart: &PieChart, size: f64) -> String {
    let total = chart.total().max(1) as f64;
    let (cx, cy) = (size / 2.0, size / 2.0);
    let radius = size * 0.38;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{s}" height="{s}" viewBox="0 0 {s} {s}" role="img" aria-label="{name}">"#,
        s = size,
        name = chart.name
    );

    let mut start = -FRAC_PI_2;
    for (i, slice) in chart.slices.iter().enumerate() {
        let sweep = 2.0 * PI * slice.value as f64 / total;
        let mid = start + sweep / 2.0;
        let (ox, oy) = polar(0.0, 0.0, radius * PULL, mid);
        let (x0, y0) = polar(cx + ox, cy + oy, radius, start);
        let (x1, y1) = polar(cx + ox, cy + oy, radius, start + sweep);
        let (tx, ty) = polar(cx + ox, cy + oy, radius * 0.62, mid);
        let large_arc = if sweep > PI { 1 } else { 0 };
        let percent = 100.0 * slice.value as f64 / total;

        let _ = write!(
            svg,
            concat!(
                r#"<g class="slice"><title>{label}: {pct:.1}%</title>"#,
                r#"<path d="M {cx:.2} {cy:.2} L {x0:.2} {y0:.2} A {r:.2} {r:.2} 0 {large} 1 {x1:.2} {y1:.2} Z" "#,
                r##"fill="{fill}" stroke="#000000" stroke-width="2"/>"##,
                r#"<text x="{tx:.2}" y="{ty:.2}" font-size="12" text-anchor="middle" dominant-baseline="middle">{value}</text></g>"#,
            ),
            label = slice.label,
            pct = percent,
            cx = cx + ox,
            cy = cy + oy,
            x0 = x0,
            y0 = y0,
            r = radius,
            large = large_arc,
            x1 = x1,
            y1 = y1,
            fill = PALETTE[i % PALETTE.len()],
            tx = tx,
            ty = ty,
            value = slice.value,
        );
        start += sweep;
    }

    svg.push_str("</svg>");
    svg
}

/// The whole page. The button resubmits with the click count incremented.
pub fn render_page(charts: &[PieChart], n_clicks: u64) -> String {
    let svgs: String = charts.iter().map(|c| render_svg(c, CHART_SIZE)).collect();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Three Pie Charts</title></head>
<body>
<form method="get" action="/">
  <input type="hidden" name="n_clicks" value="{next}">
  <button type="submit" id="update-button">Update Charts</button>
</form>
<div id="pie-charts" style="width:1000px;height:400px">
  <h3>Three Pie Charts</h3>
  <div style="display:flex;justify-content:space-between">{svgs}</div>
</div>
</body>
</html>
"#,
        next = n_clicks.saturating_add(1),
        svgs = svgs
    )
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ClickParams {
    pub n_clicks: Option<u64>,
}

pub async fn index(Query(params): Query<ClickParams>) -> Html<String> {
    let charts = random_charts(&mut rand::rng());
    Html(render_page(&charts, params.n_clicks.unwrap_or(0)))
}

pub async fn charts() -> Json<Vec<PieChart>> {
    Json(random_charts(&mut rand::rng()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/charts", get(charts))
        .route("/health", get(|| async { "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn charts() -> Vec<PieChart> {
        random_charts(&mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_three_charts_of_five_slices() {
        let charts = charts();
        assert_eq!(charts.len(), CHART_COUNT);
        for (i, chart) in charts.iter().enumerate() {
            assert_eq!(chart.name, format!("Chart {}", i + 1));
            let labels: Vec<&str> = chart.slices.iter().map(|s| s.label.as_str()).collect();
            assert_eq!(labels, LABELS);
            assert!(chart.slices.iter().all(|s| (1..=MAX_VALUE).contains(&s.value)));
        }
    }

    #[test]
    fn test_same_seed_same_charts() {
        assert_eq!(charts(), charts());
    }

    #[test]
    fn test_svg_has_one_path_per_slice() {
        let all = charts();
        let chart = &all[0];
        let svg = render_svg(chart, 300.0);
        assert_eq!(svg.matches("<path ").count(), 5);
        assert_eq!(svg.matches("stroke=\"#000000\"").count(), 5);
        for slice in &chart.slices {
            assert!(svg.contains(&format!(">{}</text>", slice.value)));
        }
    }

    #[test]
    fn test_hover_percentages_reflect_share() {
        let chart = PieChart {
            name: "Chart 1".to_string(),
            slices: vec![
                Slice { label: "A".to_string(), value: 75 },
                Slice { label: "B".to_string(), value: 25 },
            ],
        };
        let svg = render_svg(&chart, 300.0);
        assert!(svg.contains("<title>A: 75.0%</title>"));
        assert!(svg.contains("<title>B: 25.0%</title>"));
        // the 75% slice needs the large-arc flag
        assert!(svg.contains(" 0 1 1 "));
    }

    #[test]
    fn test_page_increments_click_count() {
        let page = render_page(&charts(), 4);
        assert!(page.contains("<title>Three Pie Charts</title>"));
        assert!(page.contains(r#"name="n_clicks" value="5""#));
        assert!(page.contains("Update Charts"));
        assert_eq!(page.matches("<svg ").count(), 3);
    }

    #[tokio::test]
    async fn test_index_handler_renders_page() {
        let Html(body) = index(Query(ClickParams { n_clicks: None })).await;
        assert!(body.contains(r#"value="1""#));
    }
}

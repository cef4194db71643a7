//! Front-view SVG wireframe previews.

use std::fmt::Write;

use super::Scene;

const MARGIN: f64 = 0.08;
const STROKES: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

/// Force a `.svg` extension onto a requested preview name.
pub fn preview_filename(requested: &str) -> String {
    match requested.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("svg") => format!("{stem}.svg"),
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.svg"),
        _ => format!("{requested}.svg"),
    }
}

/// Project the scene onto the X/Z plane and draw every face outline.
pub fn render_svg(scene: &Scene, size: u32) -> String {
    let size_f = f64::from(size);
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" "#
    );
    let _ = write!(
        svg,
        r##"viewBox="0 0 {size} {size}"><rect width="100%" height="100%" fill="#f4f4f4"/>"##
    );

    let projected: Vec<(String, Vec<[f64; 2]>, &Vec<Vec<usize>>)> = scene
        .objects()
        .map(|o| {
            let points = o.world_vertices().iter().map(|v| [v[0], v[2]]).collect();
            (o.name.clone(), points, &o.mesh.faces)
        })
        .collect();

    let all_points = projected.iter().flat_map(|(_, pts, _)| pts.iter());
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in all_points {
        min_x = min_x.min(p[0]);
        max_x = max_x.max(p[0]);
        min_y = min_y.min(p[1]);
        max_y = max_y.max(p[1]);
    }

    if projected.is_empty() || min_x > max_x {
        svg.push_str(r#"<text x="50%" y="50%" text-anchor="middle" font-family="sans-serif" "#);
        svg.push_str(r##"fill="#888">empty scene</text></svg>"##);
        return svg;
    }

    let extent = (max_x - min_x).max(max_y - min_y).max(1e-9);
    let usable = size_f * (1.0 - 2.0 * MARGIN);
    let scale = usable / extent;
    let offset_x = size_f * MARGIN + (usable - (max_x - min_x) * scale) / 2.0;
    let offset_y = size_f * MARGIN + (usable - (max_y - min_y) * scale) / 2.0;
    let to_screen = |p: &[f64; 2]| {
        let x = offset_x + (p[0] - min_x) * scale;
        let y = size_f - (offset_y + (p[1] - min_y) * scale);
        (x, y)
    };

    for (index, (name, points, faces)) in projected.iter().enumerate() {
        let stroke = STROKES[index % STROKES.len()];
        let _ = write!(
            svg,
            r#"<g id="{}" fill="none" stroke="{stroke}" stroke-width="1">"#,
            escape(name)
        );
        for face in faces.iter() {
            let coords: Vec<String> = face
                .iter()
                .filter_map(|&i| points.get(i))
                .map(|p| {
                    let (x, y) = to_screen(p);
                    format!("{x:.2},{y:.2}")
                })
                .collect();
            let _ = write!(svg, r#"<polygon points="{}"/>"#, coords.join(" "));
        }
        svg.push_str("</g>");
    }
    svg.push_str("</svg>");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_names_end_in_svg() {
        assert_eq!(preview_filename("preview.png"), "preview.svg");
        assert_eq!(preview_filename("preview_1.SVG"), "preview_1.svg");
        assert_eq!(preview_filename("shot"), "shot.svg");
        assert_eq!(preview_filename(".hidden"), ".hidden.svg");
    }

    #[test]
    fn empty_scene_renders_placeholder() {
        let scene = Scene::new(std::env::temp_dir(), 100);
        let svg = render_svg(&scene, 100);
        assert!(svg.contains("empty scene"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn objects_render_as_groups() {
        let mut scene = Scene::new(std::env::temp_dir(), 200);
        scene.add_box("A<1>", [1.0; 3], [0.0; 3]);
        scene.add_box("B", [1.0; 3], [3.0, 0.0, 0.0]);
        let svg = render_svg(&scene, 200);
        assert_eq!(svg.matches("<g ").count(), 2);
        assert_eq!(svg.matches("<polygon").count(), 12);
        assert!(svg.contains(r#"id="A&lt;1&gt;""#));
    }
}

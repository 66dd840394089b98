use std::io;

use serde_json::Value;

use super::format::{float_field, key_value_rows, text_field};

pub fn render_generate(data: &Value) -> io::Result<String> {
    if data.get("path").is_none() {
        return Err(io::Error::other("generate output requires path"));
    }

    let mut lines = vec![
        format!("Wrote a random population to {}.", text_field(data, "path")),
        String::new(),
    ];
    lines.extend(key_value_rows(
        &[
            ("Format:", text_field(data, "format")),
            (
                "Pool:",
                format!(
                    "{} people on {}, {} on the final day",
                    text_field(data, "start_count"),
                    text_field(data, "inception"),
                    text_field(data, "final_count"),
                ),
            ),
            ("Days:", text_field(data, "days")),
            (
                "Daily change:",
                format!(
                    "mu {}, sigma {} (seed {})",
                    float_field(data, "mu", 2),
                    float_field(data, "sigma", 2),
                    text_field(data, "seed"),
                ),
            ),
        ],
        2,
    ));
    lines.push(String::new());
    lines.push("What to do next:".to_string());
    let format = text_field(data, "format");
    lines.push(format!(
        "  1. Run `poolquota run {} --format {format}`.",
        text_field(data, "path")
    ));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::render_generate;

    #[test]
    fn generate_text_points_at_the_run_command() {
        let rendered = render_generate(&json!({
            "path": "pool.csv",
            "format": "delta",
            "seed": 3,
            "mu": 0.01,
            "sigma": 2.0,
            "inception": "2026-04-01",
            "start_count": 120,
            "final_count": 131,
            "days": 275
        }));
        assert!(rendered.is_ok());
        if let Ok(text) = rendered {
            assert!(text.contains("120 people on 2026-04-01, 131 on the final day"));
            assert!(text.contains("poolquota run pool.csv --format delta"));
        }
    }
}

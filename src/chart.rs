//! Text bar chart of scoring results.

use std::fmt::Write;

use crate::types::{compare_ids, Feedback};

const BAR_WIDTH: usize = 10;
const MAX_SCORE: f64 = 10.0;

/// Score band shown next to each bar.
pub fn band(score: f64) -> &'static str {
    if score >= 8.0 {
        "high"
    } else if score >= 6.0 {
        "good"
    } else if score >= 4.0 {
        "fair"
    } else {
        "low"
    }
}

/// Render one bar per persona, sorted by ID, followed by the average.
pub fn render(feedback: &[Feedback], avg_score: f64) -> String {
    if feedback.is_empty() {
        return String::new();
    }

    let mut rows: Vec<&Feedback> = feedback.iter().collect();
    rows.sort_by(|a, b| compare_ids(&a.persona_id, &b.persona_id));
    let id_width = rows.iter().map(|f| f.persona_id.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for f in rows {
        let score = f.score.clamp(0.0, MAX_SCORE);
        let filled = ((score / MAX_SCORE) * BAR_WIDTH as f64).round() as usize;
        let label = if f.is_sentinel() { "failed" } else { band(score) };
        let _ = writeln!(
            out,
            "{:<id_width$} |{}{}| {:>4.1} {}",
            f.persona_id,
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            f.score,
            label,
        );
    }
    let _ = writeln!(out, "{:<id_width$}  average {:.2} ({})", "", avg_score, band(avg_score));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb(id: &str, score: f64) -> Feedback {
        Feedback {
            persona_id: id.to_string(),
            score,
            reasons_to_buy: Vec::new(),
            reasons_not_to_buy: Vec::new(),
            detail_feedback: String::new(),
        }
    }

    #[test]
    fn test_bands() {
        assert_eq!(band(8.0), "high");
        assert_eq!(band(7.9), "good");
        assert_eq!(band(4.0), "fair");
        assert_eq!(band(3.5), "low");
    }

    #[test]
    fn test_render_sorted_and_scaled() {
        let chart = render(&[fb("md_2", 5.0), fb("csv_1", 10.0), fb("md_1", 0.0)], 7.5);
        let lines: Vec<&str> = chart.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "csv_1 |##########| 10.0 high");
        assert_eq!(lines[1], "md_1  |          |  0.0 failed");
        assert_eq!(lines[2], "md_2  |#####     |  5.0 fair");
        assert!(lines[3].contains("average 7.50 (good)"));
    }

    #[test]
    fn test_render_numeric_id_order() {
        let chart = render(&[fb("csv_10", 5.0), fb("csv_2", 5.0)], 5.0);
        assert!(chart.lines().next().unwrap().starts_with("csv_2 "));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[], 0.0), "");
    }
}

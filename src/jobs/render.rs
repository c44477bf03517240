//! Notification subject and body.

use super::types::ScreeningOutcome;
use std::fmt::Write;

pub fn subject(strategy: &str) -> String {
    format!("Your options screening for '{}' is complete!", strategy)
}

/// Plain-text body: match count, the first `top_n` matches, then any
/// tickers that were skipped.
pub fn body(strategy: &str, outcome: &ScreeningOutcome, top_n: usize) -> String {
    let mut out = format!("Found {} results.\n", outcome.matches.len());

    if outcome.matches.is_empty() {
        let _ = writeln!(out, "\nNo contracts matched '{}'.", strategy);
    } else if top_n > 0 {
        let shown = outcome.matches.len().min(top_n);
        let _ = writeln!(out, "\nTop {} matches:", shown);
        for s in outcome.matches.iter().take(top_n) {
            let _ = writeln!(
                out,
                "  {} {} {} {:.2}  bid {}  ask {}",
                s.underlying,
                s.expiry,
                s.option_type.code(),
                s.strike,
                quote(s.bid),
                quote(s.ask),
            );
        }
    }

    if !outcome.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped tickers:");
        for skip in &outcome.skipped {
            let _ = writeln!(out, "  {}: {}", skip.ticker, skip.reason);
        }
    }

    out
}

fn quote(q: Option<f64>) -> String {
    q.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

// src/services/report.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::signals::stance_on;
use crate::models::{DateRange, ReportData, SourceResult};

const RECENT_SIGNALS: usize = 10;
const DISCLAIMER: &str = "This report is generated automatically for information only and is not investment advice.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub markdown: PathBuf,
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// `1w`, `1m`, `3m`, `6m` or `1y`, by the length of the range.
pub fn period_suffix(range: DateRange) -> &'static str {
    match range.days() {
        d if d <= 7 => "1w",
        d if d <= 31 => "1m",
        d if d <= 93 => "3m",
        d if d <= 186 => "6m",
        _ => "1y",
    }
}

/// `{code}_{suffix}_{YYYYMMDD}`, dated by the end of the period.
pub fn file_stem(report: &ReportData) -> String {
    let range = DateRange::new(report.period_start, report.period_end);
    format!(
        "{}_{}_{}",
        report.security_info.code,
        period_suffix(range),
        report.period_end.format("%Y%m%d")
    )
}

pub fn merged_file_name(date: NaiveDate) -> String {
    format!("stock_report_{}.md", date.format("%Y%m%d"))
}

fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.*}", decimals, v))
}

fn opt_won(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), group_thousands)
}

/// The explicit marker for a section that could not be produced.
fn unavailable_marker<T>(result: &SourceResult<T>) -> Option<String> {
    match result {
        SourceResult::Ok { .. } => None,
        SourceResult::Unavailable { reason, detail } => Some(format!("> Unavailable ({}): {}\n", reason, detail)),
    }
}

pub fn render_markdown(report: &ReportData) -> String {
    let info = &report.security_info;
    let mut md = format!(
        "# {} ({}) Stock Report\n\n\
- Market: {}\n\
- Period: {} ~ {}\n\
- Generated: {}\n",
        info.name,
        info.code,
        info.market,
        report.period_start,
        report.period_end,
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
    );
    if !info.sectors.is_empty() {
        md.push_str(&format!("- Sectors: {}\n", info.sectors.join(", ")));
    }

    md.push_str("\n## Price Summary\n\n");
    if let Some(last) = report.latest_price() {
        let high = report.price_bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = report.price_bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let avg_volume = report.price_bars.iter().map(|b| b.volume as f64).sum::<f64>() / report.price_bars.len() as f64;
        md.push_str(&format!(
            "- Close ({}): {} KRW ({:+.2}%)\n- Period high / low: {} / {}\n- Average volume: {}\n- Trading days: {}\n",
            last.date,
            group_thousands(last.close),
            last.change_rate,
            group_thousands(high),
            group_thousands(low),
            group_thousands(avg_volume),
            report.price_bars.len(),
        ));
    }

    md.push_str("\n## Valuation\n\n| PER | EPS | PBR | BPS | Dividend Yield |\n|-----|-----|-----|-----|----------------|\n");
    md.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n",
        opt(info.per, 2),
        opt_won(info.eps),
        opt(info.pbr, 2),
        opt_won(info.bps),
        info.dividend_yield.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}%", v)),
    ));

    md.push_str("\n## Technical Indicators\n\n");
    match report.latest_indicators() {
        Some(p) => md.push_str(&format!(
            "| RSI(14) | TRIX | TRIX Signal | MACD | MACD Signal | Histogram |\n\
|---------|------|-------------|------|-------------|-----------|\n\
| {} | {} | {} | {} | {} | {} |\n",
            opt(p.rsi, 2),
            opt(p.trix, 4),
            opt(p.trix_signal, 4),
            opt(p.macd, 2),
            opt(p.macd_signal, 2),
            opt(p.macd_histogram, 2),
        )),
        None => md.push_str("No indicator data.\n"),
    }

    md.push_str("\n## Signals\n\n");
    if let Some(last) = report.latest_price() {
        md.push_str(&format!("Stance on {}:\n\n", last.date));
        for (indicator, action, strength) in stance_on(&report.signals, last.date) {
            md.push_str(&format!("- {}: {} (strength {}/5)\n", indicator, action, strength));
        }
    }
    let mut recent: Vec<_> = report.signals.iter().collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date));
    if recent.is_empty() {
        md.push_str("\nNo signals in this period.\n");
    } else {
        md.push_str("\n| Date | Indicator | Action | Strength | Reason |\n|------|-----------|--------|----------|--------|\n");
        for s in recent.into_iter().take(RECENT_SIGNALS) {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                s.date, s.indicator, s.action, s.strength, s.reason
            ));
        }
    }

    md.push_str("\n## Financials\n\n");
    match &report.financials {
        SourceResult::Ok { data } if data.is_empty() => md.push_str("No statements filed for this period.\n"),
        SourceResult::Ok { data } => {
            md.push_str("| Year | Report | Revenue | Operating Income | Net Income | ROE |\n|------|--------|---------|------------------|------------|-----|\n");
            for f in data {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} |\n",
                    f.year,
                    f.quarter.as_deref().unwrap_or("-"),
                    opt_won(f.revenue),
                    opt_won(f.operating_income),
                    opt_won(f.net_income),
                    f.roe.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}%", v)),
                ));
            }
        }
        unavailable => md.push_str(&unavailable_marker(unavailable).unwrap_or_default()),
    }

    md.push_str("\n## Recent Disclosures\n\n");
    match &report.disclosures {
        SourceResult::Ok { data } if data.is_empty() => md.push_str("No recent disclosures.\n"),
        SourceResult::Ok { data } => {
            for d in data {
                md.push_str(&format!("- {} [{}]({}) ({})\n", d.date, d.title, d.link, d.filer));
            }
        }
        unavailable => md.push_str(&unavailable_marker(unavailable).unwrap_or_default()),
    }

    md.push_str("\n## News\n\n");
    match &report.news {
        SourceResult::Ok { data } if data.is_empty() => md.push_str("No news in the lookback window.\n"),
        SourceResult::Ok { data } => {
            for a in data {
                md.push_str(&format!(
                    "- {} [{}]({}) - {}\n",
                    a.published_at.format("%Y-%m-%d"),
                    a.title,
                    a.link,
                    a.source
                ));
            }
        }
        unavailable => md.push_str(&unavailable_marker(unavailable).unwrap_or_default()),
    }

    md.push_str("\n## AI Analysis\n\n");
    match &report.ai_analysis {
        SourceResult::Ok { data } => {
            md.push_str(&format!(
                "**Sentiment:** {:?} ({:+.2})\n\n### News Summary\n\n{}\n",
                data.sentiment, data.sentiment_score, data.news_summary
            ));
            if !data.key_issues.is_empty() {
                md.push_str("\n### Key Issues\n\n");
                for issue in &data.key_issues {
                    md.push_str(&format!("- {}\n", issue));
                }
            }
            md.push_str(&format!("\n### Overall Opinion\n\n{}\n", data.overall_opinion));
        }
        unavailable => md.push_str(&unavailable_marker(unavailable).unwrap_or_default()),
    }

    md.push_str(&format!("\n---\n\n*{}*\n", DISCLAIMER));
    md
}

/// Bars and indicator values, one row per date.
pub fn indicator_csv(report: &ReportData) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "date", "open", "high", "low", "close", "volume", "change_rate", "rsi", "trix", "trix_signal", "macd",
        "macd_signal", "macd_histogram",
    ])?;

    let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for (bar, point) in report.price_bars.iter().zip(&report.indicator_points) {
        writer.write_record([
            bar.date.to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            format!("{:.4}", bar.change_rate),
            cell(point.rsi),
            cell(point.trix),
            cell(point.trix_signal),
            cell(point.macd),
            cell(point.macd_signal),
            cell(point.macd_histogram),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing indicator CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Writes the Markdown, JSON and CSV renderings of one report.
pub fn write_artifacts(report: &ReportData, dir: &Path) -> Result<ReportArtifacts> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let stem = file_stem(report);

    let artifacts = ReportArtifacts {
        markdown: dir.join(format!("{}.md", stem)),
        json: dir.join(format!("{}.json", stem)),
        csv: dir.join(format!("{}.csv", stem)),
    };
    fs::write(&artifacts.markdown, render_markdown(report))
        .with_context(|| format!("writing {}", artifacts.markdown.display()))?;
    fs::write(&artifacts.json, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing {}", artifacts.json.display()))?;
    fs::write(&artifacts.csv, indicator_csv(report)?)
        .with_context(|| format!("writing {}", artifacts.csv.display()))?;

    info!("Wrote report artifacts for {} as {}", report.security_info.code, stem);
    Ok(artifacts)
}

/// Concatenates Markdown reports into one document, optionally removing the parts.
pub fn merge_markdown(parts: &[PathBuf], output: &Path, delete_originals: bool) -> Result<PathBuf> {
    let mut merged = String::new();
    for (i, part) in parts.iter().enumerate() {
        let body = fs::read_to_string(part).with_context(|| format!("reading {}", part.display()))?;
        if i > 0 {
            merged.push_str("\n\n<div style=\"page-break-after: always\"></div>\n\n");
        }
        merged.push_str(body.trim_end());
        merged.push('\n');
    }
    fs::write(output, merged).with_context(|| format!("writing {}", output.display()))?;
    info!("Merged {} reports into {}", parts.len(), output.display());

    if delete_originals {
        for part in parts.iter().filter(|p| p.as_path() != output) {
            if let Err(e) = fs::remove_file(part) {
                warn!("Could not remove {}: {}", part.display(), e);
            }
        }
    }
    Ok(output.to_path_buf())
}

/// Keeps the newest `keep` Markdown reports in `dir`, deleting the rest along
/// with their JSON and CSV siblings. Returns the removed Markdown paths.
pub fn cleanup_old_reports(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut reports = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        reports.push((modified, path));
    }
    if reports.len() <= keep {
        return Ok(Vec::new());
    }

    // oldest first; name breaks ties so equal mtimes order predictably
    reports.sort();
    let excess = reports.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for (_, path) in reports.into_iter().take(excess) {
        for sibling in [path.with_extension("json"), path.with_extension("csv")] {
            if sibling.exists() {
                let _ = fs::remove_file(&sibling);
            }
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed old report {}", path.display());
                removed.push(path);
            }
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Reporting date used for merged documents: the latest period end.
pub fn batch_date(reports: &[ReportData]) -> Option<NaiveDate> {
    reports.iter().map(|r| r.period_end).max()
}

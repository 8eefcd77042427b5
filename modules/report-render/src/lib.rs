//! Plain-text rendering of published report documents.
//!
//! Section order is fixed: header, summary, top priorities, score grid,
//! issues grouped by category, footer. Scores are clamped to 0..=100 at
//! the last moment; the document itself is never mutated.

use std::fmt::Write as _;

use audit_api::{Issue, IssueSeverity, NextJsVersion, Report, TechSummary};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const RULE: &str = "------------------------------------------------------------";
const MAX_PRIORITIES: usize = 6;
const MAX_TECH_BADGES: usize = 3;

#[derive(Debug, Default, Clone)]
pub struct RenderOptions<'a> {
    /// Only list issues of this severity. Counts in the summary stay
    /// unfiltered.
    pub severity: Option<IssueSeverity>,
    /// Token the report was fetched with, shown abbreviated in the footer.
    pub token: Option<&'a str>,
}

/// Word label for a clamped score, used next to the number.
pub fn score_label(score: u8) -> &'static str {
    match score {
        85..=100 => "excellent",
        70..=84 => "good",
        55..=69 => "needs work",
        _ => "priority",
    }
}

fn score_bar(score: u8) -> String {
    let filled = usize::from(score / 10);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(10 - filled))
}

/// Display date for a report timestamp. Anything that does not parse as
/// RFC 3339 is shown as-is.
fn format_when(raw: &str) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute] UTC");
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(when) => when
            .to_offset(UtcOffset::UTC)
            .format(&fmt)
            .unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Badge strings for the detected stack, most specific first, capped at
/// three. Empty when nothing was detected.
pub fn tech_badges(tech: Option<&TechSummary>) -> Vec<String> {
    let mut badges = Vec::new();
    let Some(tech) = tech else {
        return badges;
    };
    if let Some(name) = tech.cms.as_ref().and_then(|c| c.name.as_deref()) {
        if !name.is_empty() && name != "unknown" {
            badges.push(format!("CMS: {name}"));
        }
    }
    if let Some(next) = tech.next_js.as_ref().filter(|n| n.is_next == Some(true)) {
        let mut label = String::from("Next.js");
        match next.router.as_deref() {
            Some("app") => label.push_str(" · App"),
            Some("pages") => label.push_str(" · Pages"),
            // Undetermined router still gets a segment, as "Next".
            _ => label.push_str(" · Next"),
        }
        if let Some(version) = version_badge(next.version.as_ref()) {
            label.push_str(" · ");
            label.push_str(&version);
        }
        badges.push(label);
    } else if let Some(name) = tech
        .frontend_framework
        .as_ref()
        .and_then(|f| f.name.as_deref())
    {
        if !name.is_empty() && name != "unknown" {
            badges.push(format!("Frontend: {name}"));
        }
    }
    badges.truncate(MAX_TECH_BADGES);
    badges
}

/// Most precise version hint available: exact, then guess, then floor.
fn version_badge(version: Option<&NextJsVersion>) -> Option<String> {
    let version = version?;
    if let Some(exact) = version.exact.as_deref() {
        return Some(format!("v{exact}"));
    }
    if let Some(guess) = version.guess.as_deref() {
        return Some(format!("~{guess}"));
    }
    version.min.as_deref().map(|min| format!(">={min}"))
}

pub fn render_report(report: &Report, opts: &RenderOptions<'_>) -> String {
    let mut out = String::new();
    header(&mut out, report);
    hero(&mut out, report);
    priorities(&mut out, report);
    score_grid(&mut out, report);
    issues_by_category(&mut out, report, opts.severity);
    footer(&mut out, report, opts.token);
    out
}

fn header(out: &mut String, report: &Report) {
    let title = report
        .site
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(&report.domain);
    let _ = writeln!(out, "{title} - website audit");
    let _ = writeln!(
        out,
        "{} · generated {}",
        report.url,
        format_when(&report.generated_at)
    );
    let _ = writeln!(out, "{RULE}");
}

fn hero(out: &mut String, report: &Report) {
    let global = console_core::clamp_score(report.scores.global);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "score {global}/100 ({}) {}",
        score_label(global),
        score_bar(global)
    );
    let _ = writeln!(out, "{}", report.summary.one_liner);
    let _ = writeln!(
        out,
        "priorities: {} · issues: {}",
        report.summary.priorities.len(),
        report.issues.len()
    );
    let badges = tech_badges(report.tech.as_ref());
    if badges.is_empty() {
        let _ = writeln!(out, "tech: unknown");
    } else {
        let _ = writeln!(out, "tech: {}", badges.join(", "));
    }
}

fn priorities(out: &mut String, report: &Report) {
    let _ = writeln!(out);
    let _ = writeln!(out, "top priorities");
    if report.summary.priorities.is_empty() {
        let _ = writeln!(out, "  no priorities listed.");
        return;
    }
    for (idx, priority) in report
        .summary
        .priorities
        .iter()
        .take(MAX_PRIORITIES)
        .enumerate()
    {
        let effort = priority
            .effort
            .map(|e| format!(" (effort {e})"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}. [{}] {}{effort}",
            idx + 1,
            priority.severity.label(),
            priority.title
        );
        let _ = writeln!(out, "     {}", priority.impact);
    }
}

fn score_grid(out: &mut String, report: &Report) {
    let _ = writeln!(out);
    let _ = writeln!(out, "scores by category");
    let mut categories: Vec<_> = report.scores.by_category.iter().collect();
    categories.sort_by_key(|c| std::cmp::Reverse(c.score));
    for category in categories {
        let clamped = console_core::clamp_score(category.score);
        let count = match category.issues {
            1 => "1 issue".to_string(),
            n => format!("{n} issues"),
        };
        let _ = writeln!(
            out,
            "  {:<16} {:>3}/100  {}  {count}",
            category.label,
            clamped,
            score_bar(clamped)
        );
    }
}

fn issues_by_category(out: &mut String, report: &Report, severity: Option<IssueSeverity>) {
    for category in &report.scores.by_category {
        let mut issues: Vec<&Issue> = report
            .issues
            .iter()
            .filter(|i| i.category_key == category.key)
            .filter(|i| severity.map_or(true, |wanted| i.severity == wanted))
            .collect();
        issues.sort_by_key(|i| i.severity);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "issues - {} ({} listed, score {}/100)",
            category.label,
            issues.len(),
            console_core::clamp_score(category.score)
        );
        if issues.is_empty() {
            let _ = writeln!(out, "  no issues at this severity.");
            continue;
        }
        for issue in issues {
            let mut tags = Vec::new();
            if let Some(module) = issue.module.as_deref() {
                tags.push(module.to_string());
            }
            if let Some(effort) = issue.effort {
                tags.push(format!("effort {effort}"));
            }
            let suffix = if tags.is_empty() {
                String::new()
            } else {
                format!(" ({})", tags.join(", "))
            };
            let _ = writeln!(out, "  [{}] {}{suffix}", issue.severity.label(), issue.title);
            let _ = writeln!(out, "    impact: {}", issue.impact);
            if let Some(evidence) = issue.evidence.as_deref() {
                let _ = writeln!(out, "    evidence: {evidence}");
            }
            let _ = writeln!(out, "    fix: {}", issue.recommendation);
        }
    }
}

fn footer(out: &mut String, report: &Report, token: Option<&str>) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    match token {
        Some(token) => {
            let _ = writeln!(
                out,
                "shared report for {} · token {}",
                report.domain,
                console_core::abbrev_token(token)
            );
        }
        None => {
            let _ = writeln!(out, "shared report for {}", report.domain);
        }
    }
}

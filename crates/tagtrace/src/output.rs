//! Traceability report rendering
//!
//! Every format is built from the same [`TraceabilityReport`] and the same
//! four sections (summary, matrix, missing links, coverage). Templates put
//! the sections in place through `{{title}}`, `{{summary}}`, `{{matrix}}`,
//! `{{missing}}` and `{{coverage}}` placeholders.

use eyre::{Result, WrapErr};
use facet::Facet;
use owo_colors::OwoColorize;
use std::path::Path;
use tagtrace_core::{
    Category, ChainLink, ChainMatrix, CoverageStats, MissingLink, SummaryStatistics,
    analyze_missing_connections, calculate_implementation_coverage, generate_chain_matrix,
    generate_summary_statistics,
};
use tracing::{info, warn};

pub const DEFAULT_TITLE: &str = "Traceability Report";

const EMPTY_MESSAGE: &str = "No tags found";

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    /// Text with ANSI colours
    Terminal,
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "terminal" | "term" => Some(Self::Terminal),
            "markdown" | "md" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Terminal => "terminal",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    /// File extension for exported reports.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text | Self::Terminal => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

/// Everything a report shows, computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceabilityReport {
    pub title: String,
    pub total_tags: usize,
    pub matrix: ChainMatrix,
    pub missing: Vec<MissingLink>,
    pub coverage: CoverageStats,
    pub summary: SummaryStatistics,
}

impl TraceabilityReport {
    pub fn build(links: &[ChainLink], title: &str) -> Self {
        let matrix = generate_chain_matrix(links);
        let missing = analyze_missing_connections(&matrix);
        Self {
            title: title.to_string(),
            total_tags: links.len(),
            matrix,
            missing,
            coverage: calculate_implementation_coverage(links),
            summary: generate_summary_statistics(links),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tags == 0
    }
}

/// Render a report with the built-in layout for `format`.
pub fn generate_report(links: &[ChainLink], format: ReportFormat, title: &str) -> String {
    generate_report_with_template(links, format, title, None)
}

/// Render a report into a caller template, or the built-in one when `None`.
pub fn generate_report_with_template(
    links: &[ChainLink],
    format: ReportFormat,
    title: &str,
    template: Option<&str>,
) -> String {
    render_report(&TraceabilityReport::build(links, title), format, template)
}

pub fn render_report(
    report: &TraceabilityReport,
    format: ReportFormat,
    template: Option<&str>,
) -> String {
    if format == ReportFormat::Json && template.is_none() {
        return render_json(report);
    }

    let sections = match format {
        ReportFormat::Text => text_sections(report, Painter { color: false }),
        ReportFormat::Terminal => text_sections(report, Painter { color: true }),
        ReportFormat::Markdown => markdown_sections(report),
        ReportFormat::Html => html_sections(report),
        ReportFormat::Json => json_sections(report),
    };
    let template = template.unwrap_or_else(|| default_template(format, report.is_empty()));

    fill_template(
        template,
        &[
            ("title", sections.title.as_str()),
            ("summary", sections.summary.as_str()),
            ("matrix", sections.matrix.as_str()),
            ("missing", sections.missing.as_str()),
            ("coverage", sections.coverage.as_str()),
        ],
    )
}

/// Render and write a report, creating parent directories.
pub fn export_to_file(links: &[ChainLink], path: &Path, format: ReportFormat) -> Result<()> {
    let content = generate_report(links, format, DEFAULT_TITLE);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .wrap_err_with(|| format!("Failed to write report {}", path.display()))?;

    info!("Wrote {} report to {}", format.as_str(), path.display());
    Ok(())
}

struct Sections {
    title: String,
    summary: String,
    matrix: String,
    missing: String,
    coverage: String,
}

impl Sections {
    fn empty(title: String, summary: String) -> Self {
        Self {
            title,
            summary,
            matrix: String::new(),
            missing: String::new(),
            coverage: String::new(),
        }
    }
}

fn default_template(format: ReportFormat, empty: bool) -> &'static str {
    match (format, empty) {
        (ReportFormat::Text | ReportFormat::Terminal, true) => "{{title}}\n\n{{summary}}\n",
        (ReportFormat::Text | ReportFormat::Terminal, false) => {
            "{{title}}\n\n{{summary}}\n\n{{matrix}}\n\n{{missing}}\n\n{{coverage}}\n"
        }
        (ReportFormat::Markdown, true) => "# {{title}}\n\n{{summary}}\n",
        (ReportFormat::Markdown, false) => concat!(
            "# {{title}}\n\n{{summary}}\n\n",
            "## Chain Matrix\n\n{{matrix}}\n\n",
            "## Missing Links\n\n{{missing}}\n\n",
            "## Coverage\n\n{{coverage}}\n"
        ),
        (ReportFormat::Html, true) => concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<title>{{title}}</title>\n</head>\n<body>\n",
            "<h1>{{title}}</h1>\n{{summary}}\n</body>\n</html>\n"
        ),
        (ReportFormat::Html, false) => concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<title>{{title}}</title>\n",
            "<style>\n",
            "body { font-family: system-ui, sans-serif; max-width: 800px; margin: 2rem auto; padding: 0 1rem; }\n",
            ".good { color: green; }\n",
            ".warn { color: orange; }\n",
            ".bad { color: red; }\n",
            "code { background: #f0f0f0; padding: 0.2em 0.4em; border-radius: 3px; }\n",
            "table { border-collapse: collapse; }\n",
            "td, th { padding: 0.2em 0.8em; text-align: left; }\n",
            "</style>\n</head>\n<body>\n",
            "<h1>{{title}}</h1>\n{{summary}}\n",
            "<h2>Chain Matrix</h2>\n{{matrix}}\n",
            "<h2>Missing Links</h2>\n{{missing}}\n",
            "<h2>Coverage</h2>\n{{coverage}}\n",
            "</body>\n</html>\n"
        ),
        // JSON without a caller template is rendered by `render_json`
        (ReportFormat::Json, _) => {
            "{\"title\": {{title}}, \"summary\": {{summary}}, \"matrix\": {{matrix}}, \"missing\": {{missing}}, \"coverage\": {{coverage}}}\n"
        }
    }
}

/// Replace `{{name}}` placeholders in one pass. Substituted text is never
/// rescanned; unknown placeholders are left as written.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let name = after[..end].trim();
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                output.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                output.push_str("{{");
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

fn percent_class(percent: f64) -> &'static str {
    if percent >= 80.0 {
        "good"
    } else if percent >= 50.0 {
        "warn"
    } else {
        "bad"
    }
}

// =============================================================================
// Text and terminal
// =============================================================================

#[derive(Clone, Copy)]
struct Painter {
    color: bool,
}

impl Painter {
    fn bold(self, s: &str) -> String {
        if self.color {
            s.bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn title(self, s: &str) -> String {
        if self.color {
            s.cyan().bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(self, s: &str) -> String {
        if self.color {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }

    fn alert(self, s: &str) -> String {
        if self.color {
            s.yellow().to_string()
        } else {
            s.to_string()
        }
    }

    fn percent(self, percent: f64) -> String {
        let text = format!("{percent:.1}%");
        if !self.color {
            return text;
        }
        match percent_class(percent) {
            "good" => text.green().to_string(),
            "warn" => text.yellow().to_string(),
            _ => text.red().to_string(),
        }
    }
}

fn text_sections(report: &TraceabilityReport, paint: Painter) -> Sections {
    let title = paint.title(&report.title);
    if report.is_empty() {
        return Sections::empty(title, EMPTY_MESSAGE.to_string());
    }

    let mut summary = format!(
        "{} {} across {} chains",
        paint.bold("Tags:"),
        report.total_tags,
        report.summary.total_chains
    );
    for (group, stats) in &report.summary.groups {
        summary.push_str(&format!(
            "\n  {} {:>5} tags  {} complete",
            paint.bold(&format!("{:<15}", group.as_str())),
            stats.total,
            paint.percent(stats.completion_rate)
        ));
    }

    let mut matrix = paint.bold("Chain matrix:");
    for category in Category::PRIMARY_CHAIN {
        let ids = report.matrix.stage(category);
        let ids = if ids.is_empty() {
            paint.dim("-")
        } else {
            ids.join(", ")
        };
        matrix.push_str(&format!("\n  {:<7} {}", category.as_str(), ids));
    }

    let missing = if report.missing.is_empty() {
        "No missing links".to_string()
    } else {
        let mut out = format!(
            "{} ({}):",
            paint.alert("Missing links"),
            report.missing.len()
        );
        for link in &report.missing {
            out.push_str(&format!(
                "\n  - {}: {} missing between {} and {}",
                link.chain_key,
                paint.bold(link.category.as_str()),
                link.expected_between[0],
                link.expected_between[1]
            ));
        }
        out
    };

    let stats = &report.coverage;
    let mut coverage = format!(
        "{} {} ({}/{} chains complete)",
        paint.bold("Coverage:"),
        paint.percent(stats.coverage_percentage),
        stats.complete_chains,
        stats.total_chains
    );
    for (category, cat) in &stats.category_coverage {
        coverage.push_str(&format!(
            "\n  {:<7} {} ({}/{})",
            category.as_str(),
            paint.percent(cat.percentage),
            cat.present,
            cat.total
        ));
    }
    if !stats.incomplete_chains.is_empty() {
        coverage.push_str(&format!(
            "\nIncomplete chains: {}",
            paint.alert(&stats.incomplete_chains.join(", "))
        ));
    }

    Sections {
        title,
        summary,
        matrix,
        missing,
        coverage,
    }
}

// =============================================================================
// Markdown
// =============================================================================

fn markdown_sections(report: &TraceabilityReport) -> Sections {
    let title = report.title.clone();
    if report.is_empty() {
        return Sections::empty(title, format!("_{EMPTY_MESSAGE}_"));
    }

    let mut summary = format!(
        "**Tags:** {} across {} chains\n\n| Group | Tags | Completion |\n| --- | ---: | ---: |",
        report.total_tags, report.summary.total_chains
    );
    for (group, stats) in &report.summary.groups {
        summary.push_str(&format!(
            "\n| {} | {} | {:.1}% |",
            group.as_str(),
            stats.total,
            stats.completion_rate
        ));
    }

    let mut matrix = "| Stage | IDs |\n| --- | --- |".to_string();
    for category in Category::PRIMARY_CHAIN {
        let ids = report.matrix.stage(category);
        let ids = if ids.is_empty() {
            "-".to_string()
        } else {
            ids.iter()
                .map(|id| format!("`{id}`"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        matrix.push_str(&format!("\n| {} | {} |", category.as_str(), ids));
    }

    let missing = if report.missing.is_empty() {
        "_No missing links_".to_string()
    } else {
        report
            .missing
            .iter()
            .map(|link| {
                format!(
                    "- `{}`: **{}** missing between `{}` and `{}`",
                    link.chain_key,
                    link.category.as_str(),
                    link.expected_between[0],
                    link.expected_between[1]
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let stats = &report.coverage;
    let mut coverage = format!(
        "**Coverage:** {:.1}% ({}/{} chains complete)\n\n| Stage | Present | Coverage |\n| --- | ---: | ---: |",
        stats.coverage_percentage, stats.complete_chains, stats.total_chains
    );
    for (category, cat) in &stats.category_coverage {
        coverage.push_str(&format!(
            "\n| {} | {}/{} | {:.1}% |",
            category.as_str(),
            cat.present,
            cat.total,
            cat.percentage
        ));
    }
    if !stats.incomplete_chains.is_empty() {
        let chains: Vec<String> = stats
            .incomplete_chains
            .iter()
            .map(|key| format!("`{key}`"))
            .collect();
        coverage.push_str(&format!("\n\nIncomplete chains: {}", chains.join(", ")));
    }

    Sections {
        title,
        summary,
        matrix,
        missing,
        coverage,
    }
}

// =============================================================================
// HTML
// =============================================================================

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn html_sections(report: &TraceabilityReport) -> Sections {
    let title = escape_html(&report.title);
    if report.is_empty() {
        return Sections::empty(title, format!("<p>{EMPTY_MESSAGE}</p>"));
    }

    let mut summary = format!(
        "<p><strong>Tags:</strong> {} across {} chains</p>\n<table>\n<tr><th>Group</th><th>Tags</th><th>Completion</th></tr>",
        report.total_tags, report.summary.total_chains
    );
    for (group, stats) in &report.summary.groups {
        summary.push_str(&format!(
            "\n<tr><td>{}</td><td>{}</td><td class=\"{}\">{:.1}%</td></tr>",
            group.as_str(),
            stats.total,
            percent_class(stats.completion_rate),
            stats.completion_rate
        ));
    }
    summary.push_str("\n</table>");

    let mut matrix = "<table>\n<tr><th>Stage</th><th>IDs</th></tr>".to_string();
    for category in Category::PRIMARY_CHAIN {
        let ids = report.matrix.stage(category);
        let ids = if ids.is_empty() {
            "-".to_string()
        } else {
            ids.iter()
                .map(|id| format!("<code>{}</code>", escape_html(id)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        matrix.push_str(&format!(
            "\n<tr><td>{}</td><td>{}</td></tr>",
            category.as_str(),
            ids
        ));
    }
    matrix.push_str("\n</table>");

    let missing = if report.missing.is_empty() {
        "<p>No missing links</p>".to_string()
    } else {
        let mut out = "<ul>".to_string();
        for link in &report.missing {
            out.push_str(&format!(
                "\n<li><code>{}</code>: <strong>{}</strong> missing between <code>{}</code> and <code>{}</code></li>",
                escape_html(&link.chain_key),
                link.category.as_str(),
                escape_html(&link.expected_between[0]),
                escape_html(&link.expected_between[1])
            ));
        }
        out.push_str("\n</ul>");
        out
    };

    let stats = &report.coverage;
    let mut coverage = format!(
        "<p><strong>Coverage:</strong> <span class=\"{}\">{:.1}%</span> ({}/{} chains complete)</p>\n<table>\n<tr><th>Stage</th><th>Present</th><th>Coverage</th></tr>",
        percent_class(stats.coverage_percentage),
        stats.coverage_percentage,
        stats.complete_chains,
        stats.total_chains
    );
    for (category, cat) in &stats.category_coverage {
        coverage.push_str(&format!(
            "\n<tr><td>{}</td><td>{}/{}</td><td class=\"{}\">{:.1}%</td></tr>",
            category.as_str(),
            cat.present,
            cat.total,
            percent_class(cat.percentage),
            cat.percentage
        ));
    }
    coverage.push_str("\n</table>");
    if !stats.incomplete_chains.is_empty() {
        let chains: Vec<String> = stats
            .incomplete_chains
            .iter()
            .map(|key| format!("<code>{}</code>", escape_html(key)))
            .collect();
        coverage.push_str(&format!(
            "\n<p>Incomplete chains: {}</p>",
            chains.join(", ")
        ));
    }

    Sections {
        title,
        summary,
        matrix,
        missing,
        coverage,
    }
}

// =============================================================================
// JSON
// =============================================================================

#[derive(Facet)]
struct JsonReport {
    title: String,
    total_tags: usize,
    #[facet(default)]
    message: Option<String>,
    summary: JsonSummary,
    matrix: Vec<JsonStage>,
    missing: Vec<JsonMissing>,
    coverage: JsonCoverage,
}

#[derive(Facet)]
struct JsonSummary {
    total_tags: usize,
    total_chains: usize,
    groups: Vec<JsonGroup>,
}

#[derive(Facet)]
struct JsonGroup {
    group: String,
    total: usize,
    completion_rate: f64,
    counts: Vec<JsonCount>,
}

#[derive(Facet)]
struct JsonCount {
    category: String,
    count: usize,
}

#[derive(Facet)]
struct JsonStage {
    category: String,
    ids: Vec<String>,
}

#[derive(Facet)]
struct JsonMissing {
    category: String,
    chain_key: String,
    expected_between: Vec<String>,
}

#[derive(Facet)]
struct JsonCoverage {
    total_chains: usize,
    complete_chains: usize,
    coverage_percentage: f64,
    categories: Vec<JsonCategoryCoverage>,
    incomplete_chains: Vec<String>,
}

#[derive(Facet)]
struct JsonCategoryCoverage {
    category: String,
    present: usize,
    total: usize,
    percentage: f64,
}

fn json_summary(report: &TraceabilityReport) -> JsonSummary {
    JsonSummary {
        total_tags: report.summary.total_tags,
        total_chains: report.summary.total_chains,
        groups: report
            .summary
            .groups
            .iter()
            .map(|(group, stats)| JsonGroup {
                group: group.as_str().to_string(),
                total: stats.total,
                completion_rate: stats.completion_rate,
                counts: stats
                    .counts
                    .iter()
                    .map(|(category, count)| JsonCount {
                        category: category.as_str().to_string(),
                        count: *count,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn json_matrix(report: &TraceabilityReport) -> Vec<JsonStage> {
    Category::PRIMARY_CHAIN
        .iter()
        .map(|category| JsonStage {
            category: category.as_str().to_string(),
            ids: report.matrix.stage(*category).to_vec(),
        })
        .collect()
}

fn json_missing(report: &TraceabilityReport) -> Vec<JsonMissing> {
    report
        .missing
        .iter()
        .map(|link| JsonMissing {
            category: link.category.as_str().to_string(),
            chain_key: link.chain_key.clone(),
            expected_between: link.expected_between.to_vec(),
        })
        .collect()
}

fn json_coverage(report: &TraceabilityReport) -> JsonCoverage {
    let stats = &report.coverage;
    JsonCoverage {
        total_chains: stats.total_chains,
        complete_chains: stats.complete_chains,
        coverage_percentage: stats.coverage_percentage,
        categories: stats
            .category_coverage
            .iter()
            .map(|(category, cat)| JsonCategoryCoverage {
                category: category.as_str().to_string(),
                present: cat.present,
                total: cat.total,
                percentage: cat.percentage,
            })
            .collect(),
        incomplete_chains: stats.incomplete_chains.clone(),
    }
}

fn render_json(report: &TraceabilityReport) -> String {
    let json_report = JsonReport {
        title: report.title.clone(),
        total_tags: report.total_tags,
        message: report.is_empty().then(|| EMPTY_MESSAGE.to_string()),
        summary: json_summary(report),
        matrix: json_matrix(report),
        missing: json_missing(report),
        coverage: json_coverage(report),
    };
    facet_json::to_string_pretty(&json_report).unwrap_or_else(|e| {
        warn!("JSON report serialization failed: {}", e);
        String::new()
    })
}

fn json_sections(report: &TraceabilityReport) -> Sections {
    fn to_json<'a, T: Facet<'a>>(value: &T) -> String {
        facet_json::to_string(value).unwrap_or_else(|e| {
            warn!("JSON section serialization failed: {}", e);
            "null".to_string()
        })
    }

    let title = to_json(&report.title);
    if report.is_empty() {
        return Sections {
            title,
            summary: to_json(&EMPTY_MESSAGE.to_string()),
            matrix: "[]".to_string(),
            missing: "[]".to_string(),
            coverage: "null".to_string(),
        };
    }
    Sections {
        title,
        summary: to_json(&json_summary(report)),
        matrix: to_json(&json_matrix(report)),
        missing: to_json(&json_missing(report)),
        coverage: to_json(&json_coverage(report)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!(ReportFormat::from_str("MD"), Some(ReportFormat::Markdown));
        assert_eq!(ReportFormat::from_str("terminal"), Some(ReportFormat::Terminal));
        assert_eq!(ReportFormat::from_str("pdf"), None);
        assert_eq!(ReportFormat::Html.extension(), "html");
    }

    #[test]
    fn test_fill_template_single_pass() {
        let out = fill_template(
            "{{title}}: {{ summary }} {{unknown}} {{",
            &[("title", "{{summary}}"), ("summary", "ok")],
        );
        assert_eq!(out, "{{summary}}: ok {{unknown}} {{");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_plain_text_has_no_ansi() {
        let links = vec![ChainLink::new(Category::Req, "SPEC-A-001")];
        let text = generate_report(&links, ReportFormat::Text, "Plain");
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("Coverage: 0.0% (0/1 chains complete)"));
    }
}

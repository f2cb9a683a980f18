use std::fmt::Write as FmtWrite;

use crate::models::{Answer, OutputFormat};
use crate::services::pipeline::IngestReport;
use crate::services::vector_store::{IndexDescription, IndexStats};

pub trait Formatter {
    fn format_answer(&self, view: &AnswerView) -> String;
    fn format_ingest_report(&self, report: &IngestReport) -> String;
    fn format_index_status(&self, status: &IndexStatus) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct AnswerView {
    pub query: String,
    pub answer: Answer,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub name: String,
    pub description: Option<IndexDescription>,
    pub stats: Option<IndexStats>,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, view: &AnswerView) -> String {
        let mut output = String::new();
        writeln!(output, "{}", view.answer.text.trim_end()).unwrap();

        if view.answer.no_context {
            writeln!(output).unwrap();
            writeln!(output, "(no indexed context matched this question)").unwrap();
        } else if !view.answer.sources.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "Sources:").unwrap();
            for source in &view.answer.sources {
                writeln!(output, "  {}", source).unwrap();
            }
        }

        writeln!(output).unwrap();
        writeln!(output, "({}ms)", view.duration_ms).unwrap();
        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        if let Some(started_at) = report.started_at {
            writeln!(
                output,
                "Started: {}",
                started_at.format("%Y-%m-%d %H:%M:%S UTC")
            )
            .unwrap();
        }
        writeln!(output, "Documents loaded: {}", report.documents_loaded).unwrap();
        writeln!(output, "Documents skipped: {}", report.documents_skipped).unwrap();
        writeln!(output, "Fragments prepared: {}", report.fragments_prepared).unwrap();
        writeln!(output, "Fragments indexed: {}", report.fragments_indexed).unwrap();
        writeln!(output, "Batches failed: {}", report.batches_failed).unwrap();
        writeln!(output, "Duration: {}ms", report.duration_ms).unwrap();

        if !report.errors.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "Warnings:").unwrap();
            for error in &report.errors {
                writeln!(output, "  {}", error).unwrap();
            }
        }
        if let Some(ref fatal) = report.fatal {
            writeln!(output).unwrap();
            writeln!(output, "Aborted: {}", fatal).unwrap();
        }
        output
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        let mut output = String::new();
        writeln!(output, "Index: {}", status.name).unwrap();

        match status.description {
            Some(ref description) => {
                let ready = if description.ready {
                    "[READY]"
                } else {
                    "[INITIALIZING]"
                };
                writeln!(output, "Status:    {}", ready).unwrap();
                writeln!(output, "Dimension: {}", description.dimension).unwrap();
                writeln!(output, "Metric:    {}", description.metric).unwrap();
                writeln!(output, "Host:      {}", description.host).unwrap();
            }
            None => {
                writeln!(output, "Status:    [NOT FOUND]").unwrap();
            }
        }

        if let Some(ref stats) = status.stats {
            writeln!(output, "Records:   {}", stats.record_count).unwrap();
            writeln!(output, "Fullness:  {:.1}%", stats.fullness * 100.0).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, json: &serde_json::Value) -> String {
        if self.pretty {
            serde_json::to_string_pretty(json).unwrap()
        } else {
            serde_json::to_string(json).unwrap()
        }
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, view: &AnswerView) -> String {
        self.render(&serde_json::json!({
            "query": view.query,
            "answer": view.answer.text,
            "sources": view.answer.sources,
            "no_context": view.answer.no_context,
            "duration_ms": view.duration_ms,
        }))
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        self.render(&serde_json::to_value(report).unwrap())
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        let description = status.description.as_ref().map(|d| {
            serde_json::json!({
                "dimension": d.dimension,
                "metric": d.metric,
                "host": d.host,
                "ready": d.ready,
            })
        });
        let stats = status.stats.as_ref().map(|s| {
            serde_json::json!({
                "record_count": s.record_count,
                "dimension": s.dimension,
                "fullness": s.fullness,
            })
        });

        self.render(&serde_json::json!({
            "name": status.name,
            "exists": status.description.is_some(),
            "description": description,
            "stats": stats,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, view: &AnswerView) -> String {
        let mut output = String::new();
        writeln!(output, "## Answer\n").unwrap();
        writeln!(output, "**Question:** {}\n", view.query).unwrap();
        writeln!(output, "{}\n", view.answer.text.trim_end()).unwrap();

        if view.answer.no_context {
            writeln!(output, "> *No indexed context matched this question.*\n").unwrap();
        } else if !view.answer.sources.is_empty() {
            writeln!(output, "### Sources\n").unwrap();
            for source in &view.answer.sources {
                writeln!(output, "- {}", source).unwrap();
            }
            writeln!(output).unwrap();
        }

        writeln!(output, "*{}ms*", view.duration_ms).unwrap();
        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Ingestion Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Documents loaded | {} |", report.documents_loaded).unwrap();
        writeln!(
            output,
            "| Documents skipped | {} |",
            report.documents_skipped
        )
        .unwrap();
        writeln!(
            output,
            "| Fragments prepared | {} |",
            report.fragments_prepared
        )
        .unwrap();
        writeln!(
            output,
            "| Fragments indexed | {} |",
            report.fragments_indexed
        )
        .unwrap();
        writeln!(output, "| Batches failed | {} |", report.batches_failed).unwrap();
        writeln!(output, "| Duration | {}ms |", report.duration_ms).unwrap();

        if !report.errors.is_empty() {
            writeln!(output, "\n### Warnings\n").unwrap();
            for error in &report.errors {
                writeln!(output, "- {}", error).unwrap();
            }
        }
        if let Some(ref fatal) = report.fatal {
            writeln!(output, "\n> ⚠️ **Aborted:** {}", fatal).unwrap();
        }
        output
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        let mut output = String::new();
        writeln!(output, "## Index `{}`\n", status.name).unwrap();

        match status.description {
            Some(ref description) => {
                let ready = if description.ready { "✅" } else { "⏳" };
                writeln!(output, "- **Status:** {}", ready).unwrap();
                writeln!(output, "- **Dimension:** {}", description.dimension).unwrap();
                writeln!(output, "- **Metric:** {}", description.metric).unwrap();
                writeln!(output, "- **Host:** `{}`", description.host).unwrap();
            }
            None => {
                writeln!(output, "- **Status:** ❌ not found").unwrap();
            }
        }

        if let Some(ref stats) = status.stats {
            writeln!(output, "- **Records:** {}", stats.record_count).unwrap();
            writeln!(output, "- **Fullness:** {:.1}%", stats.fullness * 100.0).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalMatch;

    fn view() -> AnswerView {
        let matches = vec![RetrievalMatch {
            id: "a".to_string(),
            score: 0.9,
            reference: "https://wiki/x/A".to_string(),
            text: "excerpt".to_string(),
        }];
        AnswerView {
            query: "What is X?".to_string(),
            answer: Answer::new("X is a thing.".to_string(), &matches, true),
            duration_ms: 120,
        }
    }

    #[test]
    fn test_text_answer_lists_sources() {
        let output = TextFormatter.format_answer(&view());
        assert!(output.contains("X is a thing."));
        assert!(output.contains("https://wiki/x/A"));
    }

    #[test]
    fn test_json_answer_is_valid_json() {
        let output = JsonFormatter::new(false).format_answer(&view());
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["answer"], "X is a thing.");
        assert_eq!(parsed["no_context"], false);
    }

    #[test]
    fn test_text_report_shows_abort() {
        let report = IngestReport {
            documents_loaded: 3,
            fatal: Some("embedding service rejected credentials".to_string()),
            ..Default::default()
        };
        let output = TextFormatter.format_ingest_report(&report);
        assert!(output.contains("Aborted: embedding service rejected credentials"));
    }
}

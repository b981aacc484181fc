//! Markdown run reports

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::models::{ClassifiedMessage, EmailCategory};
use crate::orchestrator::{RunReport, RunStatus};

/// Examples listed per category in the report
const MAX_EXAMPLES: usize = 10;

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Count, share, and examples for each category seen in a run, in category order
pub fn category_breakdown(
    results: &[ClassifiedMessage],
) -> Vec<(EmailCategory, usize, f32, Vec<&ClassifiedMessage>)> {
    let mut grouped: BTreeMap<EmailCategory, Vec<&ClassifiedMessage>> = BTreeMap::new();
    for classified in results {
        grouped.entry(classified.category).or_default().push(classified);
    }

    let total = results.len().max(1) as f32;
    grouped
        .into_iter()
        .map(|(category, messages)| {
            let share = messages.len() as f32 * 100.0 / total;
            (category, messages.len(), share, messages)
        })
        .collect()
}

impl RunReport {
    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if self.dry_run {
            md.push_str("# Mail Triage Report (DRY RUN)\n\n");
            md.push_str("> **DRY RUN MODE** - No labels were created or applied.\n\n");
        } else {
            md.push_str("# Mail Triage Report\n\n");
        }
        md.push_str(&format!(
            "Generated: {}\n\n",
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        ));

        let seconds = self.elapsed().num_seconds().max(0);
        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!("- **Scope:** {}\n", self.scope));
        md.push_str(&format!("- **Status:** {}\n", self.status));
        md.push_str(&format!("- **Batches:** {}\n", self.stats.batches));
        md.push_str(&format!("- **Messages examined:** {}\n", self.stats.total));
        md.push_str(&format!(
            "- **{}:** {}\n",
            if self.dry_run { "Classified" } else { "Labeled" },
            self.stats.processed
        ));
        md.push_str(&format!("- **Skipped:** {}\n", self.stats.skipped));
        md.push_str(&format!("- **Errors:** {}\n", self.stats.errors));
        md.push_str(&format!(
            "- **Processing time:** {} minutes {} seconds\n\n",
            seconds / 60,
            seconds % 60
        ));

        if let RunStatus::Failed(reason) = &self.status {
            md.push_str(&format!(
                "> The run stopped early: {}. Results below cover completed batches only.\n\n",
                reason
            ));
        }

        md.push_str("## Categories\n\n");
        let breakdown = category_breakdown(&self.results);
        if breakdown.is_empty() {
            md.push_str("_No messages were classified._\n\n");
        }
        for (category, count, share, examples) in breakdown {
            md.push_str(&format!(
                "### {} ({} emails, {:.1}%)\n\n",
                category.label_name(),
                count,
                share
            ));
            md.push_str("| Sender | Subject |\n");
            md.push_str("|--------|---------|\n");
            for classified in examples.iter().take(MAX_EXAMPLES) {
                let sender = if classified.message.sender_email.is_empty() {
                    &classified.message.sender
                } else {
                    &classified.message.sender_email
                };
                md.push_str(&format!(
                    "| {} | {} |\n",
                    escape_cell(sender),
                    escape_cell(&truncate_string(&classified.message.subject, 60))
                ));
            }
            md.push('\n');
        }

        if self.dry_run {
            md.push_str("---\n\n");
            md.push_str("_To apply labels, run the command again without the `--dry-run` flag._\n");
        }

        md
    }

    /// Save report to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_markdown()).await?;
        Ok(())
    }
}

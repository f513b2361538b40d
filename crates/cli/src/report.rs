//! Console output: captured messages and the end-of-run summary table

use colored::Colorize;
use pipewarden_core::application::{ProbeOutcome, TeardownReport};
use pipewarden_core::domain::{MessageKind, OutputLine, ReadSummary, ReaderEnd};
use pipewarden_core::SupervisorError;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Item")]
    item: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn kind_label(kind: Option<MessageKind>) -> &'static str {
    match kind {
        Some(MessageKind::Response) => "response",
        Some(MessageKind::Error) => "error",
        Some(MessageKind::Request) => "request",
        Some(MessageKind::Notification) => "notification",
        Some(MessageKind::Batch) => "batch",
        Some(MessageKind::Other) | None => "message",
    }
}

/// Print one captured structured message
pub fn print_message(line: &OutputLine) {
    let label = kind_label(line.kind());
    let tag = if line.kind() == Some(MessageKind::Error) {
        format!("✗ {}", label).red().bold()
    } else {
        format!("✓ {}", label).green().bold()
    };
    println!("{} {}", tag, line.raw);
}

fn reader_end(end: &ReaderEnd) -> String {
    match end {
        ReaderEnd::EndOfStream => "end of stream".to_string(),
        ReaderEnd::Captured => "captured first message".to_string(),
        ReaderEnd::Cancelled => "cancelled at teardown".to_string(),
        ReaderEnd::ReadError(e) => format!("read error: {}", e),
    }
}

/// Render the summary table
pub fn render(
    command: &str,
    probe: &Result<ProbeOutcome, SupervisorError>,
    teardown: &TeardownReport,
    summary: &ReadSummary,
) -> String {
    let mut rows = vec![ReportRow {
        item: "Command",
        value: command.to_string(),
    }];

    match probe {
        Ok(outcome) => {
            rows.push(ReportRow {
                item: "Requests sent",
                value: outcome.sent.to_string(),
            });
            rows.push(ReportRow {
                item: "Acknowledged",
                value: outcome.acknowledged.to_string(),
            });
            if !outcome.unanswered.is_empty() {
                rows.push(ReportRow {
                    item: "Unanswered",
                    value: outcome.unanswered.join(", "),
                });
            }
        }
        Err(e) => rows.push(ReportRow {
            item: "Exchange error",
            value: e.to_string(),
        }),
    }

    rows.push(ReportRow {
        item: "Messages captured",
        value: summary.delivered.to_string(),
    });
    rows.push(ReportRow {
        item: "Lines discarded",
        value: summary.discarded.to_string(),
    });
    rows.push(ReportRow {
        item: "Reader stopped",
        value: reader_end(&summary.end),
    });
    rows.push(ReportRow {
        item: "Teardown",
        value: teardown
            .steps
            .iter()
            .map(|s| format!("{:?}", s))
            .collect::<Vec<_>>()
            .join(" → "),
    });
    rows.push(ReportRow {
        item: "Final state",
        value: teardown.final_state.to_string(),
    });

    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewarden_core::application::TeardownStep;
    use pipewarden_core::domain::ProcessState;

    fn killed_report() -> TeardownReport {
        TeardownReport {
            steps: vec![
                TeardownStep::Terminate,
                TeardownStep::Wait,
                TeardownStep::Kill,
                TeardownStep::Release,
            ],
            final_state: ProcessState::Killed,
            timed_out: true,
            errors: vec![],
            skipped: false,
        }
    }

    #[test]
    fn test_render_successful_probe() {
        let probe = Ok(ProbeOutcome {
            sent: 3,
            acknowledged: 1,
            unanswered: vec!["tools/list".to_string()],
        });
        let summary = ReadSummary {
            lines_read: 2,
            delivered: 1,
            discarded: 1,
            end: ReaderEnd::Captured,
        };

        let table = render("uvx mcp-server-time", &probe, &killed_report(), &summary);

        assert!(table.contains("uvx mcp-server-time"));
        assert!(table.contains("Unanswered"));
        assert!(table.contains("tools/list"));
        assert!(table.contains("captured first message"));
        assert!(table.contains("Terminate → Wait → Kill → Release"));
        assert!(table.contains("KILLED"));
    }

    #[test]
    fn test_render_exchange_error() {
        let probe = Err(SupervisorError::Write("Broken pipe".to_string()));

        let table = render("x", &probe, &killed_report(), &ReadSummary::new());

        assert!(table.contains("Exchange error"));
        assert!(table.contains("Broken pipe"));
        assert!(!table.contains("Requests sent"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(kind_label(Some(MessageKind::Response)), "response");
        assert_eq!(kind_label(Some(MessageKind::Error)), "error");
        assert_eq!(kind_label(None), "message");
    }
}

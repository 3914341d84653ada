//! Output formatting utilities.
//!
//! Pretty printing for CLI commands.

use agora_governance::ProposalState;
use agora_types::{Hash, U256};
use colored::{ColoredString, Colorize};
use tabled::{Table, Tabled};

use crate::scenario::ScenarioReport;

/// Shorten a hash for tables.
pub fn format_hash_short(hash: &Hash) -> String {
    let s = hash.to_string();
    if s.len() > 14 {
        format!("{}...{}", &s[..10], &s[s.len() - 4..])
    } else {
        s
    }
}

/// Format a weight with thousands separators.
pub fn format_weight(value: &U256) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Colour a proposal state by outcome.
pub fn format_state(state: ProposalState) -> ColoredString {
    let label = format!("{:?}", state);
    match state {
        ProposalState::Executed | ProposalState::Succeeded => label.green(),
        ProposalState::Queued | ProposalState::Active | ProposalState::Pending => label.yellow(),
        ProposalState::Defeated | ProposalState::Canceled | ProposalState::Expired => label.red(),
    }
}

/// Print success message.
pub fn print_success(msg: &str) {
    println!("{}", format!("✓ {}", msg).green());
}

/// Print error message.
pub fn print_error(msg: &str) {
    eprintln!("{}", format!("✗ {}", msg).red());
}

/// Print a scenario report as tables.
pub fn print_report(report: &ScenarioReport) {
    #[derive(Tabled)]
    struct OptionRow {
        index: u32,
        label: String,
        votes: String,
    }

    println!("{}", "Scenario Result".bold());
    println!("{}", "=".repeat(50));
    println!(
        "Final block:  {} (timestamp {})",
        report.final_block.number, report.final_block.timestamp
    );
    println!("Steps:        {}", report.steps);
    println!(
        "Bond desk:    started={} bonds={}",
        report.desk.started, report.desk.bonds
    );

    for proposal in &report.proposals {
        println!();
        println!("{} {}", "Proposal".bold(), format_hash_short(&proposal.id).bright_cyan());
        println!("Description:  {}", proposal.description);
        println!("Kind:         {:?}", proposal.kind);
        println!("State:        {}", format_state(proposal.state));
        if let Some(eta) = proposal.eta {
            println!("Eta:          {}", eta);
        }

        let rows: Vec<OptionRow> = proposal
            .labels
            .iter()
            .zip(&proposal.tallies)
            .enumerate()
            .map(|(index, (label, tally))| OptionRow {
                index: index as u32,
                label: if Some(index as u32) == proposal.leading_option {
                    format!("{} *", label)
                } else {
                    label.clone()
                },
                votes: format_weight(tally),
            })
            .collect();
        if !rows.is_empty() {
            println!("{}", Table::new(rows));
        }
    }
}

/// Print a report as pretty JSON.
pub fn print_json(report: &ScenarioReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

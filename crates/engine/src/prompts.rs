// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for the different run types.
//!
//! Plain string building, no template engine. Failing-check details pass
//! through the sanitizer before they reach a prompt.

use ap_core::{sanitize, Config, RunRecord, TicketRef};

/// Substitute `{identifier}` and `{title}` in a configured pattern.
fn render_pattern(pattern: &str, ticket: &TicketRef) -> String {
    pattern
        .replace("{identifier}", &ticket.identifier.to_lowercase())
        .replace("{title}", &ticket.title)
}

/// Prompt for an executor run: implement the ticket and open a PR.
pub fn executor_prompt(ticket: &TicketRef, config: &Config) -> String {
    let branch = render_pattern(&config.executor.branch_pattern, ticket);
    let commit = render_pattern(&config.executor.commit_pattern, ticket);
    format!(
        "You are working on ticket {identifier}: {title}\n\n\
         You are in an isolated clone of the repository with branch `{branch}` checked out.\n\n\
         Implement the ticket completely:\n\
         1. Read the relevant code before changing anything.\n\
         2. Make the change, keeping commits small. Use the commit message style `{commit}`.\n\
         3. Run the project's tests and linters; fix what you break.\n\
         4. Push the branch and open a pull request titled `{identifier}: {title}`,\n\
            with a body that explains the change and references {identifier}.\n\n\
         Do not modify ticket states in the tracker; the orchestrator owns the workflow.",
        identifier = ticket.identifier,
        title = ticket.title,
    )
}

/// Prompt for a fixer run: make CI green on an existing PR branch.
pub fn fixer_prompt(
    ticket: &TicketRef,
    branch: &str,
    failing_checks: &[String],
    config: &Config,
) -> String {
    let failing = if failing_checks.is_empty() {
        "unknown checks".to_string()
    } else {
        sanitize(&failing_checks.join(", "))
    };
    let commit = render_pattern(&config.executor.commit_pattern, ticket);
    format!(
        "CI is failing on the pull request for ticket {identifier}: {title}\n\n\
         You are in a clone with the PR branch `{branch}` checked out.\n\
         Failing checks: {failing}\n\n\
         Diagnose and fix the failures:\n\
         1. Reproduce the failing checks locally where possible.\n\
         2. Fix the root cause; do not delete or skip tests to get to green.\n\
         3. Commit using the style `{commit}` and push to `{branch}`.\n\n\
         Do not open a new pull request and do not touch the tracker.",
        identifier = ticket.identifier,
        title = ticket.title,
    )
}

/// Prompt for a planning run: groom triage into ready work.
pub fn planning_prompt(config: &Config) -> String {
    format!(
        "The ready queue is running low. Review the tracker's triage tickets for team \
         `{team}` and prepare the most valuable ones for autonomous execution:\n\
         1. Pick tickets that are small, self-contained, and well-specified.\n\
         2. Rewrite their descriptions so an agent can implement them without questions:\n\
            concrete acceptance criteria, affected files or modules, edge cases.\n\
         3. Split anything too large into leaf tickets.\n\
         4. Move only fully specified tickets to the ready state.\n\n\
         Leave everything you are unsure about in triage with a comment.",
        team = config.linear.team,
    )
}

/// Prompt for a review run over a batch of finished agent runs.
pub fn review_prompt(runs: &[RunRecord]) -> String {
    let mut listing = String::new();
    for run in runs {
        listing.push_str(&format!(
            "- {} [{}] {}: {}\n",
            run.id,
            run.status,
            run.ticket_id,
            run.error
                .as_deref()
                .map(sanitize)
                .unwrap_or_else(|| "ok".to_string()),
        ));
    }
    format!(
        "Review the following finished agent runs for quality problems and patterns:\n\n\
         {listing}\n\
         For each run, judge whether the outcome matches the ticket's intent. Summarize\n\
         recurring failure causes and flag any run that needs human attention, with the\n\
         run id and a one-line reason."
    )
}

/// Prompt for a project-owner run: keep project-level tracking coherent.
pub fn project_owner_prompt(config: &Config) -> String {
    format!(
        "Act as the project owner for team `{team}`. Review the tracker's projects:\n\
         1. Check each active project's tickets for staleness and missing follow-ups.\n\
         2. File tickets for gaps you find; link them to the right project.\n\
         3. Update project descriptions where reality has drifted.\n\n\
         Make no code changes.",
        team = config.linear.team,
    )
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bodies posted to the provider: the grant panel and batch reports.

use serde_json::{json, Value};

use crate::batch::BatchReport;

const BLURPLE: u32 = 0x5865F2;
const GREEN: u32 = 0x43B581;
const RED: u32 = 0xFF0000;

/// Entries itemized in a batch report before the "+N more" footer.
pub const REPORT_ITEM_LIMIT: usize = 20;

/// Panel prompting users to authenticate for `role_id`, listing everyone
/// who already did.
pub fn panel(role_id: &str, auth_link: &str, authenticated: &[String]) -> Value {
    let mut description = format!(
        "Authenticate with the button below to join.\n\n\
         **Role granted:** <@&{role_id}>\n\n\
         The role is assigned automatically once you finish."
    );
    if !authenticated.is_empty() {
        description.push_str("\n\n**Authenticated users:**");
        for user in authenticated {
            description.push_str(&format!("\n• <@{user}>"));
        }
    }

    json!({
        "embeds": [{
            "title": "🔐 Server verification",
            "description": description,
            "color": BLURPLE,
        }],
        "components": [{
            "type": 1,
            "components": [{
                "type": 2,
                "style": 5,
                "label": "Authenticate",
                "url": auth_link,
                "emoji": { "name": "✅" },
            }],
        }],
    })
}

/// Report embed for a finished batch run.
pub fn batch_report(report: &BatchReport) -> Value {
    let lines = report.render_lines(REPORT_ITEM_LIMIT);
    let details = if lines.is_empty() { "none".to_owned() } else { lines.join("\n") };
    let color = if report.success_count > 0 { GREEN } else { RED };

    let mut embed = json!({
        "title": "📢 Membership batch finished",
        "description": format!(
            "**Target guild:** {} (`{}`)\n\n**Results:**\nSucceeded: {}\nFailed: {}",
            report.guild_name, report.guild_id, report.success_count, report.fail_count
        ),
        "color": color,
        "fields": [{ "name": "Details", "value": details }],
    });
    let hidden = report.results.len().saturating_sub(REPORT_ITEM_LIMIT);
    if hidden > 0 {
        embed["footer"] = json!({ "text": format!("+{hidden} more results") });
    }
    json!({ "embeds": [embed] })
}

/// Single-line error embed, used when a batch cannot start.
pub fn error_embed(message: &str) -> Value {
    json!({
        "embeds": [{ "title": "❌ Error", "description": message, "color": RED }],
    })
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;

// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::pipeline::Diagnostics;
use crate::infrastructure::reachability::ProbeOutcome;
use crate::shared::error::FleetError;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use std::collections::HashMap;

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    /// Render one row per probed address, in input order.
    pub fn render_probe(&self, addresses: &[String], outcome: &ProbeOutcome) -> String {
        if addresses.is_empty() {
            return "No addresses probed".to_string();
        }

        let mut losses = HashMap::new();
        if let Some(err) = &outcome.error {
            collect_losses(err, &mut losses);
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("ADDRESS").set_alignment(CellAlignment::Left),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("LOST").set_alignment(CellAlignment::Center),
            ]);

        let mut unreachable = 0;
        for address in addresses {
            let reachable = !outcome.unreachable.contains(address);
            if !reachable {
                unreachable += 1;
            }
            let lost = losses
                .get(address.as_str())
                .map(|(lost, count)| format!("{}/{}", lost, count))
                .unwrap_or_else(|| "-".to_string());

            table.add_row(vec![
                Cell::new(address),
                Cell::new(format!(
                    "{} {}",
                    StatusIcon::reachability_icon(reachable),
                    StatusIcon::reachability_text(reachable)
                ))
                .fg(self.theme.reachability_color(reachable)),
                Cell::new(lost).fg(self.theme.muted),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Reachability {} ─╮\n",
            format!("[{}/{} unreachable]", unreachable, addresses.len()).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Legend: {} Reachable  {} Unreachable\n",
            StatusIcon::SUCCESS.green(),
            StatusIcon::ERROR.red()
        ));
        output
    }

    /// Render the diagnostics of a pipeline run, oldest first.
    pub fn render_diagnostics(&self, diagnostics: &Diagnostics) -> String {
        if diagnostics.is_empty() {
            return "No diagnostics recorded".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("TIME").set_alignment(CellAlignment::Left),
                Cell::new("STAGE").set_alignment(CellAlignment::Left),
                Cell::new("POLICY").set_alignment(CellAlignment::Center),
                Cell::new("ERROR").set_alignment(CellAlignment::Left),
            ]);

        for diagnostic in diagnostics.iter() {
            let disposition = diagnostic.error.disposition();
            table.add_row(vec![
                Cell::new(diagnostic.at.format("%H:%M:%S")).fg(self.theme.muted),
                Cell::new(&diagnostic.stage).fg(self.theme.info),
                Cell::new(format!(
                    "{} {}",
                    StatusIcon::disposition_icon(disposition),
                    StatusIcon::disposition_text(disposition)
                ))
                .fg(self.theme.disposition_color(disposition)),
                Cell::new(diagnostic.error.to_string()),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Diagnostics {} ─╮\n",
            format!("[{} recorded]", diagnostics.len()).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output
    }
}

fn collect_losses<'a>(err: &'a FleetError, losses: &mut HashMap<&'a str, (usize, usize)>) {
    match err {
        FleetError::Unreachable {
            address,
            lost,
            count,
        } => {
            losses.insert(address.as_str(), (*lost, *count));
        }
        FleetError::Joined(errors) => {
            for err in errors {
                collect_losses(err, losses);
            }
        }
        _ => {}
    }
}

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

//! Status icons for CLI output

use crate::shared::error::Disposition;

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    pub const SUCCESS: &'static str = "✓";

    pub const WARNING: &'static str = "⚠";

    pub const ERROR: &'static str = "✗";

    /// Failure that was logged and swallowed
    pub const IGNORED: &'static str = "·";

    pub fn reachability_icon(reachable: bool) -> &'static str {
        if reachable {
            Self::SUCCESS
        } else {
            Self::ERROR
        }
    }

    pub fn reachability_text(reachable: bool) -> &'static str {
        if reachable {
            "Reachable"
        } else {
            "Unreachable"
        }
    }

    pub fn disposition_icon(disposition: Disposition) -> &'static str {
        match disposition {
            Disposition::Ignore => Self::IGNORED,
            Disposition::Isolate => Self::WARNING,
            Disposition::Fatal => Self::ERROR,
        }
    }

    pub fn disposition_text(disposition: Disposition) -> &'static str {
        match disposition {
            Disposition::Ignore => "Ignored",
            Disposition::Isolate => "Isolated",
            Disposition::Fatal => "Fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability_icon() {
        assert_eq!(StatusIcon::reachability_icon(true), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::reachability_icon(false), StatusIcon::ERROR);
        assert_eq!(StatusIcon::reachability_text(false), "Unreachable");
    }

    #[test]
    fn test_disposition_text() {
        assert_eq!(StatusIcon::disposition_text(Disposition::Ignore), "Ignored");
        assert_eq!(StatusIcon::disposition_text(Disposition::Isolate), "Isolated");
        assert_eq!(StatusIcon::disposition_text(Disposition::Fatal), "Fatal");
        assert_eq!(
            StatusIcon::disposition_icon(Disposition::Fatal),
            StatusIcon::ERROR
        );
    }
}

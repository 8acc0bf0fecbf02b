// Copyright 2022 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use crate::types::ValidatorStatistics;

use serde::{Deserialize, Serialize};
use std::fmt;

const LOW_PERFORMANCE_THRESHOLD: f64 = 50.0;
const GOOD_PERFORMANCE_THRESHOLD: f64 = 70.0;
const HIGH_COMMISSION_THRESHOLD: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// A human readable suggestion about a validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Advisory {
    fn new(severity: Severity, title: &str, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.to_string(),
            description: description.into(),
        }
    }
}

/// Advisories for a statistics record: exactly one about performance, followed by one about
/// commission when it is above the threshold.
pub fn classify(stats: &ValidatorStatistics) -> Vec<Advisory> {
    let mut advisories = Vec::with_capacity(2);

    advisories.push(if stats.performance < LOW_PERFORMANCE_THRESHOLD {
        Advisory::new(
            Severity::Critical,
            "Low Performance",
            "Performance below 50%. Switch to a more reliable validator for better rewards.",
        )
    } else if stats.performance < GOOD_PERFORMANCE_THRESHOLD {
        Advisory::new(
            Severity::Warning,
            "Average Performance",
            "Performance below optimal range. Monitor closely.",
        )
    } else {
        Advisory::new(
            Severity::Info,
            "Good Performance",
            "Validator performing well. No immediate action needed.",
        )
    });

    if stats.commission > HIGH_COMMISSION_THRESHOLD {
        advisories.push(Advisory::new(
            Severity::Warning,
            "High Commission",
            format!(
                "Commission is {:.2}%, above recommended (<10%). Consider switching for better returns.",
                stats.commission
            ),
        ));
    }

    advisories
}

//! Domain enums shared by the store and the HTTP boundary.
//! Stored as their lowercase string form; serde uses the same spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }
    };
}

string_enum!(ProposalStatus {
    Draft => "draft",
    InReview => "in_review",
    Approved => "approved",
    Submitted => "submitted",
    Won => "won",
    Lost => "lost",
});

string_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

string_enum!(SectionType {
    ExecutiveSummary => "executive_summary",
    ProblemStatement => "problem_statement",
    Solution => "solution",
    Timeline => "timeline",
    Pricing => "pricing",
    Team => "team",
    CaseStudies => "case_studies",
    Appendix => "appendix",
});

string_enum!(KnowledgeCategory {
    CaseStudy => "case_study",
    SolutionTemplate => "solution_template",
    PricingModel => "pricing_model",
    TeamBio => "team_bio",
    CompanyOverview => "company_overview",
    TechnicalSpec => "technical_spec",
});

string_enum!(ApprovalStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

string_enum!(UserRole {
    Admin => "admin",
    Manager => "manager",
    Presales => "presales",
    Viewer => "viewer",
});

//! CRM domain entities built on the generic layer.

#[macro_use]
mod macros;
mod accounts;
mod activity;
mod sales;

pub use accounts::{Contact, ContactDraft, ContactPatch, Organization, OrganizationDraft, OrganizationPatch};
pub use activity::{Interaction, InteractionDraft, InteractionPatch};
pub use sales::{Opportunity, OpportunityDraft, OpportunityPatch, Product, ProductDraft, ProductPatch};

use crate::core::{Result, SyncError, Value};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles");
    static ref SKU_PATTERN: Regex =
        Regex::new(r"^[A-Z0-9]{2,}(-[A-Z0-9]+)*$").expect("sku pattern compiles");
}

/// Closed set of labels stored as text.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident default $default:ident { $( $variant:ident => $label:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $variant ),+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( Self::$variant ),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SyncError;

            fn from_str(raw: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(raw.trim()))
                    .ok_or_else(|| {
                        SyncError::validation(format!(
                            "'{}' is not a valid {}",
                            raw,
                            stringify!($name)
                        ))
                    })
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::Text(value.as_str().to_string())
            }
        }
    };
}

labelled_enum! {
    ContactStatus default Lead {
        Lead => "lead",
        Active => "active",
        Inactive => "inactive",
    }
}

labelled_enum! {
    /// Sales pipeline position of an opportunity.
    OpportunityStage default Prospecting {
        Prospecting => "prospecting",
        Qualification => "qualification",
        Proposal => "proposal",
        Negotiation => "negotiation",
        ClosedWon => "closed_won",
        ClosedLost => "closed_lost",
    }
}

impl OpportunityStage {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

labelled_enum! {
    InteractionKind default Note {
        Call => "call",
        Email => "email",
        Meeting => "meeting",
        Note => "note",
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_email(value: &str) -> Result<()> {
    if !EMAIL_PATTERN.is_match(value.trim()) {
        return Err(SyncError::validation(format!(
            "'{}' is not a valid email address",
            value
        )));
    }
    Ok(())
}

fn check_sku(value: &str) -> Result<()> {
    if !SKU_PATTERN.is_match(value) {
        return Err(SyncError::validation(format!(
            "SKU '{}' must be upper-case letters and digits, optionally dash-separated",
            value
        )));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(SyncError::validation(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

fn check_within(field: &str, value: i64, range: RangeInclusive<i64>) -> Result<()> {
    if !range.contains(&value) {
        return Err(SyncError::validation(format!(
            "{} must be between {} and {}",
            field,
            range.start(),
            range.end()
        )));
    }
    Ok(())
}

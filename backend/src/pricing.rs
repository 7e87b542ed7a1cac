//! Host compensation and guest-facing totals.
//!
//! Every monetary output is rounded to cents as the last step of its formula.

use std::fmt;
use std::str::FromStr;

use log::warn;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Weeks in the normalized "four-week" billing window.
pub const FOUR_WEEK_WINDOW: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalType {
    Nightly,
    Weekly,
    Monthly,
}

impl RentalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalType::Nightly => "nightly",
            RentalType::Weekly => "weekly",
            RentalType::Monthly => "monthly",
        }
    }

    /// Missing or unrecognized classifications degrade to nightly billing.
    pub fn resolve(raw: Option<&str>) -> RentalType {
        match raw.map(str::parse::<RentalType>) {
            Some(Ok(rental_type)) => rental_type,
            Some(Err(unknown)) => {
                warn!("Unknown rental type '{}', falling back to nightly pricing", unknown.0);
                RentalType::Nightly
            }
            None => {
                warn!("Rental type not specified, falling back to nightly pricing");
                RentalType::Nightly
            }
        }
    }
}

impl fmt::Display for RentalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRentalType(pub String);

impl FromStr for RentalType {
    type Err = UnknownRentalType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nightly" => Ok(RentalType::Nightly),
            "weekly" => Ok(RentalType::Weekly),
            "monthly" => Ok(RentalType::Monthly),
            _ => Err(UnknownRentalType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompensationInput {
    pub rental_type: RentalType,
    pub nights_per_week: u32,
    pub weekly_rate: Decimal,
    /// Host rate for the selected nights-per-week tier.
    pub nightly_rate: Decimal,
    pub weeks: u32,
    pub monthly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compensation {
    pub total_compensation: Decimal,
    pub duration_months: Decimal,
    pub four_week_rent: Decimal,
    /// Host's canonical rate for the billing period of the rental type.
    pub host_rate: Decimal,
}

/// Rounds to cents, half a cent going away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn calculate_compensation(input: &CompensationInput) -> Compensation {
    let weeks = Decimal::from(input.weeks);
    let nights = Decimal::from(input.nights_per_week);
    let window = Decimal::from(FOUR_WEEK_WINDOW);
    let duration_months = weeks / window;

    match input.rental_type {
        RentalType::Nightly => Compensation {
            total_compensation: round2(input.nightly_rate * nights * weeks),
            duration_months,
            four_week_rent: round2(input.nightly_rate * nights * window),
            host_rate: round2(input.nightly_rate),
        },
        RentalType::Weekly => Compensation {
            total_compensation: round2(input.weekly_rate * weeks),
            duration_months,
            four_week_rent: round2(input.weekly_rate * window),
            host_rate: round2(input.weekly_rate),
        },
        RentalType::Monthly => {
            let monthly_rate = input.monthly_rate.unwrap_or(input.weekly_rate * window);
            Compensation {
                total_compensation: round2(monthly_rate * duration_months),
                duration_months,
                four_week_rent: round2(monthly_rate),
                host_rate: round2(monthly_rate),
            }
        }
    }
}

/// Total the guest pays at their proposed nightly price.
pub fn guest_total(proposed_nightly_price: Decimal, nights_per_week: u32, weeks: u32) -> Decimal {
    round2(proposed_nightly_price * Decimal::from(nights_per_week) * Decimal::from(weeks))
}

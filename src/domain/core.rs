mod archive;
mod conflict;
mod interval;
mod lifecycle;
mod request;
mod resource;

use std::fmt;

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

pub use self::archive::*;
pub use self::conflict::*;
pub use self::interval::*;
pub use self::lifecycle::*;
pub use self::request::*;
pub use self::resource::*;

/// Monetary amount in the currency's minor-less unit (whole yen / dollars).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: u64,
    currency: Currency,
}

impl Money {
    pub fn new(amount: u64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Flat multiplication, used for `daily rate x billable days`.
    pub fn times(&self, n: u32) -> Self {
        Self {
            amount: self.amount * u64::from(n),
            currency: self.currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.currency.symbol(),
            self.amount.to_formatted_string(&Locale::en)
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::new(0, Currency::JPY)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    JPY,
    USD,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::JPY => "¥",
            Currency::USD => "$",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::JPY
    }
}

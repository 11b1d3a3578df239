//! Bill and payment models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a bill comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Biannually,
    Annually,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Biannually => "biannually",
            Frequency::Annually => "annually",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown bill frequency: {0}")]
pub struct UnknownFrequency(String);

impl FromStr for Frequency {
    type Err = UnknownFrequency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "biannually" => Ok(Frequency::Biannually),
            "annually" => Ok(Frequency::Annually),
            other => Err(UnknownFrequency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = UnknownFrequency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A recurring bill owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub payment_url: String,
    #[sqlx(try_from = "String")]
    pub frequency: Frequency,
    pub estimated_total_due: f64,
    pub first_due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a bill about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBill {
    pub user_id: Uuid,
    pub name: String,
    pub payment_url: String,
    pub frequency: Frequency,
    pub estimated_total_due: f64,
    pub first_due_date: NaiveDate,
}

/// Partial update for a bill. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillChanges {
    pub name: Option<String>,
    pub payment_url: Option<String>,
    pub frequency: Option<Frequency>,
    pub estimated_total_due: Option<f64>,
    pub first_due_date: Option<NaiveDate>,
}

impl BillChanges {
    pub fn apply_to(self, bill: &mut Bill) {
        if let Some(name) = self.name {
            bill.name = name;
        }
        if let Some(url) = self.payment_url {
            bill.payment_url = url;
        }
        if let Some(frequency) = self.frequency {
            bill.frequency = frequency;
        }
        if let Some(due) = self.estimated_total_due {
            bill.estimated_total_due = due;
        }
        if let Some(date) = self.first_due_date {
            bill.first_due_date = date;
        }
    }
}

/// A payment made against a bill for one due date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub due_date: NaiveDate,
    pub total_paid: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a payment about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub bill_id: Uuid,
    pub due_date: NaiveDate,
    pub total_paid: f64,
}

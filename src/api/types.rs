//! Records exchanged with the expense API.

use serde::{Deserialize, Deserializer, Serialize};

/// Postgres `numeric` columns arrive as strings; aggregates arrive as numbers.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Amount {
    Number(f64),
    Text(String),
  }

  match Amount::deserialize(deserializer)? {
    Amount::Number(n) => Ok(n),
    Amount::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
  }
}

fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  struct Wrapper(#[serde(deserialize_with = "deserialize_amount")] f64);

  Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(n)| n))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: i64,
  pub name: String,
  pub color: String,
  pub icon: String,
  pub created_at: String,
  pub updated_at: String,
}

/// Body for creating or replacing a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInput {
  pub name: String,
  pub color: String,
  pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
  Income,
  Expense,
  Transfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
  pub id: i64,
  pub description: String,
  #[serde(deserialize_with = "deserialize_amount")]
  pub amount: f64,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  pub date: String,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub category_id: Option<i64>,
  #[serde(default)]
  pub category_name: Option<String>,
  #[serde(default)]
  pub category_color: Option<String>,
  #[serde(default)]
  pub category_icon: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

/// Body for creating or replacing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
  pub description: String,
  pub amount: f64,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
  #[serde(deserialize_with = "deserialize_amount")]
  pub current_balance: f64,
  #[serde(deserialize_with = "deserialize_amount")]
  pub monthly_change: f64,
  #[serde(deserialize_with = "deserialize_amount")]
  pub total_income: f64,
  #[serde(deserialize_with = "deserialize_amount")]
  pub total_expenses: f64,
}

/// One day of income/expense totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
  pub date: String,
  #[serde(default, deserialize_with = "deserialize_optional_amount")]
  pub income: Option<f64>,
  #[serde(default, deserialize_with = "deserialize_optional_amount")]
  pub expenses: Option<f64>,
}

/// Window for `/api/statistics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Period {
  Day,
  Week,
  #[default]
  Month,
  Year,
}

impl Period {
  pub fn as_str(self) -> &'static str {
    match self {
      Period::Day => "day",
      Period::Week => "week",
      Period::Month => "month",
      Period::Year => "year",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transaction_accepts_numeric_string_amount() {
    let json = r##"{
      "id": 7,
      "description": "Coffee",
      "amount": "3.50",
      "type": "expense",
      "date": "2024-03-01T00:00:00.000Z",
      "notes": null,
      "created_at": "2024-03-01T08:00:00.000Z",
      "updated_at": "2024-03-01T08:00:00.000Z",
      "category_name": "Food",
      "category_color": "#ff0000",
      "category_icon": "coffee"
    }"##;
    let tx: Transaction = serde_json::from_str(json).unwrap();
    assert_eq!(tx.amount, 3.5);
    assert_eq!(tx.kind, TransactionType::Expense);
    assert_eq!(tx.category_id, None);
    assert_eq!(tx.category_name.as_deref(), Some("Food"));
  }

  #[test]
  fn test_transaction_input_uses_type_field() {
    let input = TransactionInput {
      description: "Coffee".into(),
      amount: -3.5,
      kind: TransactionType::Expense,
      category_id: None,
      date: None,
      notes: None,
    };
    assert_eq!(
      serde_json::to_string(&input).unwrap(),
      r#"{"description":"Coffee","amount":-3.5,"type":"expense"}"#
    );
  }

  #[test]
  fn test_statistics_with_null_sums() {
    let stats: Vec<Statistics> =
      serde_json::from_str(r#"[{"date":"2024-03-01","income":"10.00","expenses":null}]"#).unwrap();
    assert_eq!(stats[0].income, Some(10.0));
    assert_eq!(stats[0].expenses, None);
  }

  #[test]
  fn test_balance_from_zeroed_default() {
    let balance: Balance = serde_json::from_str(
      r#"{"current_balance":0,"monthly_change":0,"total_income":0,"total_expenses":0}"#,
    )
    .unwrap();
    assert_eq!(balance, Balance::default());
  }

  #[test]
  fn test_period_defaults_to_month() {
    assert_eq!(Period::default().as_str(), "month");
  }
}

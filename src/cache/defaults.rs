//! Built-in responses for API reads that fail with nothing cached.

use serde_json::json;

use super::traits::Served;
use crate::net::HttpResponse;

/// Pick the placeholder for an API path.
///
/// Balance gets a zeroed aggregate, transaction and category collections get
/// an empty list. Everything else gets `503 {"error":"Offline"}`.
pub fn offline_default(path: &str) -> Served {
  if path.starts_with("/api/balance") {
    let body = json!({
      "current_balance": 0,
      "monthly_change": 0,
      "total_income": 0,
      "total_expenses": 0,
    });
    return Served::offline_default(HttpResponse::json(200, body.to_string()));
  }

  if path.starts_with("/api/transactions") || path.starts_with("/api/categories") {
    return Served::offline_default(HttpResponse::json(200, "[]"));
  }

  Served::unavailable(HttpResponse::json(
    503,
    json!({ "error": "Offline" }).to_string(),
  ))
}

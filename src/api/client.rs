//! Expense API client with offline reads and queued writes.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::types::{Balance, Category, CategoryInput, Period, Statistics, Transaction, TransactionInput};
use crate::cache::{CacheManager, ResponseStore, ServeSource};
use crate::net::{HttpResponse, Method, RequestDescriptor};
use crate::sync::{EntryId, OfflineWriter, WriteOutcome};

/// Data returned by a read, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub source: ServeSource,
}

/// Result of a mutation: applied now, or queued for replay.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
  Applied(T),
  Queued(EntryId),
}

/// Typed client for the expense API.
///
/// Reads go through the cache manager; mutations go through the offline writer.
pub struct ExpenseClient<S: ResponseStore> {
  base_url: Url,
  cache: CacheManager<S>,
  writer: OfflineWriter,
}

impl<S: ResponseStore> ExpenseClient<S> {
  pub fn new(base_url: Url, cache: CacheManager<S>, writer: OfflineWriter) -> Self {
    Self {
      base_url,
      cache,
      writer,
    }
  }

  pub fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid API path {}: {}", path, e))
  }

  /// GET a path through the cache manager and return the raw response.
  pub async fn get_raw(&self, path: &str) -> Result<(HttpResponse, ServeSource)> {
    let request = RequestDescriptor::get(self.endpoint(path)?);
    let served = self
      .cache
      .fetch(&request)
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", path, e))?;
    Ok((served.response, served.source))
  }

  async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Fetched<T>> {
    let (response, source) = self.get_raw(path).await?;

    if source == ServeSource::Unavailable {
      return Err(eyre!("{} is not available offline", path));
    }
    if !response.is_success() {
      return Err(eyre!("HTTP {} from {}: {}", response.status, path, response.body_text()));
    }

    let data = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse response from {}: {}", path, e))?;
    Ok(Fetched { data, source })
  }

  /// Send a mutation and return the raw outcome.
  pub async fn send_raw(&self, method: Method, path: &str, body: Option<String>) -> Result<WriteOutcome> {
    let mut request = RequestDescriptor::new(method, self.endpoint(path)?);
    if let Some(body) = body {
      request = request.with_json(body);
    }
    Ok(self.writer.send(request).await)
  }

  async fn mutate(&self, method: Method, path: &str, body: Option<String>) -> Result<Mutation<HttpResponse>> {
    let label = format!("{} {}", method, path);
    match self.send_raw(method, path, body).await? {
      WriteOutcome::Applied(response) => Ok(Mutation::Applied(response)),
      WriteOutcome::Queued(id) => {
        tracing::info!(%id, request = %label, "saved offline, will sync when back online");
        Ok(Mutation::Queued(id))
      }
      WriteOutcome::Rejected(response) => Err(eyre!(
        "{} rejected: HTTP {}: {}",
        label,
        response.status,
        response.body_text()
      )),
      WriteOutcome::Dropped(reason) => Err(eyre!("{} could not be saved offline: {}", label, reason)),
    }
  }

  async fn mutate_json<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> Result<Mutation<T>> {
    let body = serde_json::to_string(body).map_err(|e| eyre!("Failed to encode body: {}", e))?;
    match self.mutate(method, path, Some(body)).await? {
      Mutation::Applied(response) => {
        let record = serde_json::from_slice(&response.body)
          .map_err(|e| eyre!("Failed to parse response from {}: {}", path, e))?;
        Ok(Mutation::Applied(record))
      }
      Mutation::Queued(id) => Ok(Mutation::Queued(id)),
    }
  }

  async fn delete(&self, path: &str) -> Result<Mutation<()>> {
    Ok(match self.mutate(Method::Delete, path, None).await? {
      Mutation::Applied(_) => Mutation::Applied(()),
      Mutation::Queued(id) => Mutation::Queued(id),
    })
  }

  // Categories

  pub async fn categories(&self) -> Result<Fetched<Vec<Category>>> {
    self.read("/api/categories").await
  }

  pub async fn create_category(&self, input: &CategoryInput) -> Result<Mutation<Category>> {
    self.mutate_json(Method::Post, "/api/categories", input).await
  }

  pub async fn update_category(&self, id: i64, input: &CategoryInput) -> Result<Mutation<Category>> {
    self
      .mutate_json(Method::Put, &format!("/api/categories/{}", id), input)
      .await
  }

  pub async fn delete_category(&self, id: i64) -> Result<Mutation<()>> {
    self.delete(&format!("/api/categories/{}", id)).await
  }

  // Transactions

  pub async fn transactions(&self) -> Result<Fetched<Vec<Transaction>>> {
    self.read("/api/transactions").await
  }

  pub async fn create_transaction(&self, input: &TransactionInput) -> Result<Mutation<Transaction>> {
    self.mutate_json(Method::Post, "/api/transactions", input).await
  }

  pub async fn update_transaction(
    &self,
    id: i64,
    input: &TransactionInput,
  ) -> Result<Mutation<Transaction>> {
    self
      .mutate_json(Method::Put, &format!("/api/transactions/{}", id), input)
      .await
  }

  pub async fn delete_transaction(&self, id: i64) -> Result<Mutation<()>> {
    self.delete(&format!("/api/transactions/{}", id)).await
  }

  // Aggregates

  pub async fn balance(&self) -> Result<Fetched<Balance>> {
    self.read("/api/balance").await
  }

  pub async fn statistics(&self, period: Period) -> Result<Fetched<Vec<Statistics>>> {
    self
      .read(&format!("/api/statistics?period={}", period.as_str()))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::TransactionType;
  use crate::cache::SqliteStorage;
  use crate::db::Database;
  use crate::net::mock::MockTransport;
  use crate::sync::{DurableQueue, MemoryQueue, StatusHandle, SyncStatus};
  use std::sync::Arc;

  const BASE: &str = "http://localhost:3001";

  struct Fixture {
    client: ExpenseClient<SqliteStorage>,
    transport: Arc<MockTransport>,
    queue: Arc<MemoryQueue>,
  }

  fn fixture(transport: MockTransport) -> Fixture {
    let transport = Arc::new(transport);
    let queue = Arc::new(MemoryQueue::new());
    let status = StatusHandle::new(SyncStatus::default());
    let base = Url::parse(BASE).unwrap();
    let cache = CacheManager::new(
      SqliteStorage::new(Database::open_in_memory().unwrap()),
      transport.clone(),
      base.clone(),
      "v1",
    );
    let writer = OfflineWriter::new(transport.clone(), queue.clone(), status);
    Fixture {
      client: ExpenseClient::new(base, cache, writer),
      transport,
      queue,
    }
  }

  fn coffee() -> TransactionInput {
    TransactionInput {
      description: "Coffee".into(),
      amount: -3.5,
      kind: TransactionType::Expense,
      category_id: None,
      date: None,
      notes: None,
    }
  }

  #[tokio::test]
  async fn test_offline_create_is_queued_with_exact_body() {
    let f = fixture(MockTransport::offline());

    let result = f.client.create_transaction(&coffee()).await.unwrap();
    assert!(matches!(result, Mutation::Queued(_)));

    let entry = f.queue.front().await.unwrap().unwrap();
    assert_eq!(entry.request.method, Method::Post);
    assert_eq!(entry.request.url.path(), "/api/transactions");
    assert_eq!(
      entry.request.body.as_deref(),
      Some(r#"{"description":"Coffee","amount":-3.5,"type":"expense"}"#)
    );
    assert_eq!(
      entry.request.headers.get("Content-Type").map(String::as_str),
      Some("application/json")
    );
  }

  #[tokio::test]
  async fn test_online_create_returns_record() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Post,
      "/api/transactions",
      HttpResponse::json(
        201,
        r#"{"id":9,"description":"Coffee","amount":"-3.50","type":"expense","date":"2024-03-01","created_at":"x","updated_at":"x"}"#,
      ),
    );

    match f.client.create_transaction(&coffee()).await.unwrap() {
      Mutation::Applied(tx) => {
        assert_eq!(tx.id, 9);
        assert_eq!(tx.amount, -3.5);
      }
      other => panic!("expected Applied, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_delete_missing_id_is_an_error() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Delete,
      "/api/categories/42",
      HttpResponse::json(404, r#"{"error":"Category not found"}"#),
    );

    let err = f.client.delete_category(42).await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(f.queue.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_balance_is_zeroed() {
    let f = fixture(MockTransport::offline());
    let balance = f.client.balance().await.unwrap();
    assert_eq!(balance.data, Balance::default());
    assert_eq!(balance.source, ServeSource::OfflineDefault);
  }

  #[tokio::test]
  async fn test_offline_statistics_without_cache_is_an_error() {
    let f = fixture(MockTransport::offline());
    assert!(f.client.statistics(Period::Week).await.is_err());
  }

  #[tokio::test]
  async fn test_statistics_served_from_cache_per_period() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Get,
      "/api/statistics?period=week",
      HttpResponse::json(200, r#"[{"date":"2024-03-01","income":"5","expenses":"2.5"}]"#),
    );
    f.client.statistics(Period::Week).await.unwrap();

    f.transport.set_online(false);
    let stats = f.client.statistics(Period::Week).await.unwrap();
    assert_eq!(stats.source, ServeSource::Cache);
    assert_eq!(stats.data[0].expenses, Some(2.5));
    assert!(f.client.statistics(Period::Year).await.is_err());
  }

  fn food() -> CategoryInput {
    CategoryInput {
      name: "Food".into(),
      color: "#ff0000".into(),
      icon: "utensils".into(),
    }
  }

  #[tokio::test]
  async fn test_online_create_category_returns_record() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Post,
      "/api/categories",
      HttpResponse::json(
        201,
        r##"{"id":3,"name":"Food","color":"#ff0000","icon":"utensils","created_at":"x","updated_at":"x"}"##,
      ),
    );

    match f.client.create_category(&food()).await.unwrap() {
      Mutation::Applied(category) => {
        assert_eq!(category.id, 3);
        assert_eq!(category.color, "#ff0000");
      }
      other => panic!("expected Applied, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_offline_update_category_is_queued_as_put() {
    let f = fixture(MockTransport::offline());

    let result = f.client.update_category(3, &food()).await.unwrap();
    assert!(matches!(result, Mutation::Queued(_)));

    let entry = f.queue.front().await.unwrap().unwrap();
    assert_eq!(entry.request.method, Method::Put);
    assert_eq!(entry.request.url.path(), "/api/categories/3");
    assert_eq!(
      entry.request.body.as_deref(),
      Some(r##"{"name":"Food","color":"#ff0000","icon":"utensils"}"##)
    );
  }

  #[tokio::test]
  async fn test_online_update_transaction_is_applied() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Put,
      "/api/transactions/9",
      HttpResponse::json(
        200,
        r#"{"id":9,"description":"Coffee","amount":"-4.00","type":"expense","date":"2024-03-01","created_at":"x","updated_at":"y"}"#,
      ),
    );
    let input = TransactionInput {
      amount: -4.0,
      ..coffee()
    };

    match f.client.update_transaction(9, &input).await.unwrap() {
      Mutation::Applied(tx) => assert_eq!(tx.amount, -4.0),
      other => panic!("expected Applied, got {:?}", other),
    }
    let call = f.transport.calls().pop().unwrap();
    assert_eq!(call.method, Method::Put);
    assert_eq!(
      call.body.as_deref(),
      Some(r#"{"description":"Coffee","amount":-4.0,"type":"expense"}"#)
    );
    assert_eq!(f.queue.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_update_missing_transaction_is_rejected() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Put,
      "/api/transactions/404",
      HttpResponse::json(404, r#"{"error":"Transaction not found"}"#),
    );

    let err = f.client.update_transaction(404, &coffee()).await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(f.queue.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_delete_transaction_applied_then_queued() {
    let f = fixture(MockTransport::online());
    f.transport.route(
      Method::Delete,
      "/api/transactions/9",
      HttpResponse::json(200, r#"{"message":"Transaction deleted"}"#),
    );
    assert_eq!(
      f.client.delete_transaction(9).await.unwrap(),
      Mutation::Applied(())
    );

    f.transport.set_online(false);
    assert!(matches!(
      f.client.delete_transaction(10).await.unwrap(),
      Mutation::Queued(_)
    ));
    let entry = f.queue.front().await.unwrap().unwrap();
    assert_eq!(entry.request.method, Method::Delete);
    assert_eq!(entry.request.url.path(), "/api/transactions/10");
    assert_eq!(entry.request.body, None);
  }

  #[tokio::test]
  async fn test_categories_list_offline_defaults_to_empty() {
    let f = fixture(MockTransport::offline());
    let categories = f.client.categories().await.unwrap();
    assert!(categories.data.is_empty());
  }
}

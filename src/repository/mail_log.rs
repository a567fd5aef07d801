//! Delivery log repository

use crate::domain::{DeliveryStatus, LogId, MailLog, MailStatus, NewMailLog};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailLogRepository: Send + Sync {
    /// Append a log record and return its id
    async fn create(&self, input: &NewMailLog) -> Result<LogId>;

    /// Overwrite status and error; `false` when the record does not exist
    async fn set_status(&self, id: LogId, status: &DeliveryStatus) -> Result<bool>;

    async fn find_by_id(&self, id: LogId) -> Result<Option<MailLog>>;

    /// Records in the given status, oldest first
    async fn find_by_status(&self, status: MailStatus) -> Result<Vec<MailLog>>;

    /// Move a `skip` record back to `created` and clear its error.
    /// `false` unless the record exists and is still skipped.
    async fn requeue_skipped(&self, id: LogId) -> Result<bool>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, recipient, cc, bcc, subject, body, from_email, from_name, status, error,
           template_id, template, service_template, service_template_params, attachments,
           debug, created_at, updated_at
    FROM mail_logs
"#;

pub struct MailLogRepositoryImpl {
    pool: MySqlPool,
}

impl MailLogRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailLogRepository for MailLogRepositoryImpl {
    async fn create(&self, input: &NewMailLog) -> Result<LogId> {
        let result = sqlx::query(
            r#"
            INSERT INTO mail_logs
                (recipient, cc, bcc, subject, body, from_email, from_name, status,
                 template_id, template, service_template, service_template_params,
                 attachments, debug, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(&input.recipient)
        .bind(&input.cc)
        .bind(&input.bcc)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(&input.from_email)
        .bind(&input.from_name)
        .bind(input.status)
        .bind(input.template_id)
        .bind(&input.template)
        .bind(&input.service_template)
        .bind(&input.service_template_params)
        .bind(&input.attachments)
        .bind(input.debug)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as LogId)
    }

    async fn set_status(&self, id: LogId, status: &DeliveryStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE mail_logs SET status = ?, error = ?, updated_at = NOW() WHERE id = ?",
        )
        .bind(status.kind())
        .bind(status.error())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: LogId) -> Result<Option<MailLog>> {
        let log = sqlx::query_as::<_, MailLog>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(log)
    }

    async fn find_by_status(&self, status: MailStatus) -> Result<Vec<MailLog>> {
        let logs = sqlx::query_as::<_, MailLog>(&format!(
            "{} WHERE status = ? ORDER BY id",
            SELECT_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn requeue_skipped(&self, id: LogId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mail_logs SET status = ?, error = NULL, updated_at = NOW()
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(MailStatus::Created)
        .bind(id)
        .bind(MailStatus::Skip)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Log store kept in memory; used when no database is configured and in tests
#[derive(Default)]
pub struct InMemoryMailLogRepository {
    logs: RwLock<BTreeMap<LogId, MailLog>>,
}

impl InMemoryMailLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, in creation order
    pub async fn records(&self) -> Vec<MailLog> {
        self.logs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl MailLogRepository for InMemoryMailLogRepository {
    async fn create(&self, input: &NewMailLog) -> Result<LogId> {
        let mut logs = self.logs.write().await;
        let id = logs.keys().next_back().copied().unwrap_or(0) + 1;
        logs.insert(id, MailLog::from_new(id, input));
        Ok(id)
    }

    async fn set_status(&self, id: LogId, status: &DeliveryStatus) -> Result<bool> {
        let mut logs = self.logs.write().await;
        match logs.get_mut(&id) {
            Some(log) => {
                log.status = status.kind();
                log.error = status.error().map(str::to_string);
                log.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_id(&self, id: LogId) -> Result<Option<MailLog>> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn find_by_status(&self, status: MailStatus) -> Result<Vec<MailLog>> {
        Ok(self
            .logs
            .read()
            .await
            .values()
            .filter(|log| log.status == status)
            .cloned()
            .collect())
    }

    async fn requeue_skipped(&self, id: LogId) -> Result<bool> {
        let mut logs = self.logs.write().await;
        match logs.get_mut(&id) {
            Some(log) if log.status == MailStatus::Skip => {
                log.status = MailStatus::Created;
                log.error = None;
                log.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn new_log(recipient: &str, status: MailStatus) -> NewMailLog {
        NewMailLog {
            recipient: recipient.to_string(),
            cc: None,
            bcc: None,
            subject: Some("Subject".to_string()),
            body: Some("Body".to_string()),
            from_email: None,
            from_name: None,
            status,
            template_id: None,
            template: None,
            service_template: None,
            service_template_params: None,
            attachments: None,
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_mock_set_status() {
        let mut mock = MockMailLogRepository::new();

        mock.expect_set_status()
            .with(eq(5), eq(DeliveryStatus::Sending))
            .returning(|_, _| Ok(true));

        assert!(mock.set_status(5, &DeliveryStatus::Sending).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_create_assigns_sequential_ids() {
        let repo = InMemoryMailLogRepository::new();

        let first = repo
            .create(&new_log("a@example.com", MailStatus::Created))
            .await
            .unwrap();
        let second = repo
            .create(&new_log("b@example.com", MailStatus::Disabled))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
        let stored = repo.find_by_id(2).await.unwrap().unwrap();
        assert_eq!(stored.recipient, "b@example.com");
        assert_eq!(stored.status, MailStatus::Disabled);
    }

    #[tokio::test]
    async fn test_in_memory_set_status() {
        let repo = InMemoryMailLogRepository::new();
        let id = repo
            .create(&new_log("a@example.com", MailStatus::Created))
            .await
            .unwrap();

        assert!(repo
            .set_status(id, &DeliveryStatus::failure("smtp down"))
            .await
            .unwrap());
        let stored = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, MailStatus::Failure);
        assert_eq!(stored.error.as_deref(), Some("smtp down"));

        assert!(!repo.set_status(99, &DeliveryStatus::Success).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_find_by_status() {
        let repo = InMemoryMailLogRepository::new();
        for (recipient, status) in [
            ("a@example.com", MailStatus::Skip),
            ("b@example.com", MailStatus::Created),
            ("c@example.com", MailStatus::Skip),
        ] {
            repo.create(&new_log(recipient, status)).await.unwrap();
        }

        let skipped: Vec<String> = repo
            .find_by_status(MailStatus::Skip)
            .await
            .unwrap()
            .into_iter()
            .map(|log| log.recipient)
            .collect();
        assert_eq!(skipped, vec!["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_in_memory_requeue_skipped_only_once() {
        let repo = InMemoryMailLogRepository::new();
        let skipped = repo
            .create(&new_log("a@example.com", MailStatus::Skip))
            .await
            .unwrap();
        let created = repo
            .create(&new_log("b@example.com", MailStatus::Created))
            .await
            .unwrap();

        assert!(repo.requeue_skipped(skipped).await.unwrap());
        assert!(!repo.requeue_skipped(skipped).await.unwrap());
        assert!(!repo.requeue_skipped(created).await.unwrap());
        assert!(!repo.requeue_skipped(99).await.unwrap());

        let stored = repo.find_by_id(skipped).await.unwrap().unwrap();
        assert_eq!(stored.status, MailStatus::Created);
        assert_eq!(repo.records().await.len(), 2);
    }
}

//! Mail template repository

use crate::domain::{split_addresses, join_addresses, MailTemplate, TemplateVariable};
use crate::error::{MailError, Result};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, MySqlPool};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTemplateRepository: Send + Sync {
    /// Find a template by its unique key
    async fn find_by_template(&self, template: &str) -> Result<Option<MailTemplate>>;

    /// List all templates ordered by key
    async fn list(&self) -> Result<Vec<MailTemplate>>;

    /// Insert or update by template key
    async fn upsert(&self, template: &MailTemplate) -> Result<MailTemplate>;
}

/// Load template definitions from a JSON file (an array of templates)
pub async fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<MailTemplate>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read templates file {}", path.display()))?;

    let templates: Vec<MailTemplate> = serde_json::from_str(&content)?;
    Ok(templates)
}

#[derive(FromRow)]
struct MailTemplateRow {
    id: i64,
    template: String,
    name: String,
    subject: Option<String>,
    body: Option<String>,
    recipients: Option<String>,
    cc: Option<String>,
    bcc: Option<String>,
    from_email: Option<String>,
    from_name: Option<String>,
    service_template: Option<String>,
    #[sqlx(json)]
    variables: Vec<TemplateVariable>,
}

impl From<MailTemplateRow> for MailTemplate {
    fn from(row: MailTemplateRow) -> Self {
        Self {
            id: Some(row.id),
            template: row.template,
            name: row.name,
            subject: row.subject,
            body: row.body,
            recipients: split_addresses(row.recipients.as_deref()),
            cc: split_addresses(row.cc.as_deref()),
            bcc: split_addresses(row.bcc.as_deref()),
            from_email: row.from_email,
            from_name: row.from_name,
            service_template: row.service_template,
            variables: row.variables,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, template, name, subject, body, recipients, cc, bcc,
           from_email, from_name, service_template, variables
    FROM mail_templates
"#;

pub struct MailTemplateRepositoryImpl {
    pool: MySqlPool,
}

impl MailTemplateRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailTemplateRepository for MailTemplateRepositoryImpl {
    async fn find_by_template(&self, template: &str) -> Result<Option<MailTemplate>> {
        let row = sqlx::query_as::<_, MailTemplateRow>(&format!(
            "{} WHERE template = ?",
            SELECT_COLUMNS
        ))
        .bind(template)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<MailTemplate>> {
        let rows =
            sqlx::query_as::<_, MailTemplateRow>(&format!("{} ORDER BY template", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, template: &MailTemplate) -> Result<MailTemplate> {
        let variables = serde_json::to_string(&template.variables)?;

        sqlx::query(
            r#"
            INSERT INTO mail_templates
                (template, name, subject, body, recipients, cc, bcc,
                 from_email, from_name, service_template, variables, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW(), NOW())
            ON DUPLICATE KEY UPDATE
                name = VALUES(name),
                subject = VALUES(subject),
                body = VALUES(body),
                recipients = VALUES(recipients),
                cc = VALUES(cc),
                bcc = VALUES(bcc),
                from_email = VALUES(from_email),
                from_name = VALUES(from_name),
                service_template = VALUES(service_template),
                variables = VALUES(variables),
                updated_at = NOW()
            "#,
        )
        .bind(&template.template)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(join_addresses(&template.recipients, ","))
        .bind(join_addresses(&template.cc, ","))
        .bind(join_addresses(&template.bcc, ","))
        .bind(&template.from_email)
        .bind(&template.from_name)
        .bind(&template.service_template)
        .bind(&variables)
        .execute(&self.pool)
        .await?;

        self.find_by_template(&template.template)
            .await?
            .ok_or_else(|| MailError::Internal(anyhow::anyhow!("Failed to upsert template")))
    }
}

/// Template store backed by memory, usually filled from a definitions file
#[derive(Default)]
pub struct InMemoryMailTemplateRepository {
    templates: RwLock<BTreeMap<String, MailTemplate>>,
}

impl InMemoryMailTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = MailTemplate>) -> Self {
        let templates = templates
            .into_iter()
            .enumerate()
            .map(|(index, mut template)| {
                template.id.get_or_insert(index as i64 + 1);
                (template.template.clone(), template)
            })
            .collect();

        Self {
            templates: RwLock::new(templates),
        }
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_templates(load_definitions(path).await?))
    }
}

#[async_trait]
impl MailTemplateRepository for InMemoryMailTemplateRepository {
    async fn find_by_template(&self, template: &str) -> Result<Option<MailTemplate>> {
        Ok(self.templates.read().await.get(template).cloned())
    }

    async fn list(&self) -> Result<Vec<MailTemplate>> {
        Ok(self.templates.read().await.values().cloned().collect())
    }

    async fn upsert(&self, template: &MailTemplate) -> Result<MailTemplate> {
        let mut templates = self.templates.write().await;

        let mut stored = template.clone();
        stored.id = match templates.get(&template.template) {
            Some(existing) => existing.id,
            None => Some(templates.values().filter_map(|t| t.id).max().unwrap_or(0) + 1),
        };
        templates.insert(stored.template.clone(), stored.clone());

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn welcome() -> MailTemplate {
        MailTemplate::new("welcome", "Welcome")
            .with_subject("Hello {{name}}")
            .with_body("<p>Hi {{name}}</p>")
            .with_variable("name", "Customer name")
    }

    #[tokio::test]
    async fn test_mock_find_by_template() {
        let mut mock = MockMailTemplateRepository::new();

        mock.expect_find_by_template()
            .with(eq("welcome"))
            .returning(|_| Ok(Some(welcome())));

        let result = mock.find_by_template("welcome").await.unwrap();
        assert_eq!(result.unwrap().name, "Welcome");
    }

    #[tokio::test]
    async fn test_in_memory_lookup_and_list() {
        let repo = InMemoryMailTemplateRepository::with_templates([
            welcome(),
            MailTemplate::new("alpha", "Alpha"),
        ]);

        assert!(repo.find_by_template("missing").await.unwrap().is_none());

        let found = repo.find_by_template("welcome").await.unwrap().unwrap();
        assert_eq!(found.id, Some(1));

        let keys: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.template)
            .collect();
        assert_eq!(keys, vec!["alpha", "welcome"]);
    }

    #[tokio::test]
    async fn test_in_memory_upsert_keeps_id() {
        let repo = InMemoryMailTemplateRepository::new();

        let first = repo.upsert(&welcome()).await.unwrap();
        assert_eq!(first.id, Some(1));

        let updated = repo
            .upsert(&welcome().with_subject("Changed"))
            .await
            .unwrap();
        assert_eq!(updated.id, Some(1));
        assert_eq!(updated.subject.as_deref(), Some("Changed"));

        let second = repo
            .upsert(&MailTemplate::new("other", "Other"))
            .await
            .unwrap();
        assert_eq!(second.id, Some(2));
    }

    #[tokio::test]
    async fn test_load_definitions_from_json() {
        let path = std::env::temp_dir().join(format!("mailroom-templates-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{
                "template": "order_shipped",
                "name": "Order shipped",
                "subject": "Order {{number}} shipped",
                "body": "<p>Your order {{number}} is on its way</p>",
                "cc": ["orders@example.com"],
                "fromEmail": "shop@example.com",
                "variables": [{"variable": "number", "label": "Order number"}]
            }]"#,
        )
        .unwrap();

        let repo = InMemoryMailTemplateRepository::from_json_file(&path)
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        let template = repo.find_by_template("order_shipped").await.unwrap().unwrap();
        assert_eq!(template.cc, vec!["orders@example.com"]);
        assert_eq!(template.from_email.as_deref(), Some("shop@example.com"));
        assert_eq!(template.variables[0].label, "Order number");
    }

    #[tokio::test]
    async fn test_load_definitions_missing_file() {
        let result = load_definitions("/nonexistent/mailroom-templates.json").await;
        assert!(matches!(result, Err(MailError::Internal(_))));
    }

    #[test]
    fn test_row_conversion_splits_addresses() {
        let row = MailTemplateRow {
            id: 9,
            template: "t".to_string(),
            name: "T".to_string(),
            subject: None,
            body: None,
            recipients: Some("a@example.com, b@example.com".to_string()),
            cc: None,
            bcc: Some("".to_string()),
            from_email: None,
            from_name: None,
            service_template: None,
            variables: vec![],
        };

        let template: MailTemplate = row.into();
        assert_eq!(template.id, Some(9));
        assert_eq!(template.recipients, vec!["a@example.com", "b@example.com"]);
        assert!(template.cc.is_empty());
        assert!(template.bcc.is_empty());
    }
}

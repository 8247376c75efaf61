use super::util::{is_valid_table_name, store_error};
use crate::domain_model::*;
use crate::domain_port::*;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use tracing::info;

pub struct MySqlAccountStore {
    pool: MySqlPool,
    table: String,
}

impl MySqlAccountStore {
    pub fn try_new(pool: MySqlPool, table: impl Into<String>) -> anyhow::Result<Self> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(anyhow!("invalid account table name: {:?}", table));
        }
        Ok(MySqlAccountStore { pool, table })
    }

    /// Create the account table if it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let ddl = format!(
            r#"
CREATE TABLE IF NOT EXISTS `{}` (
    id                      BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    user_name               VARCHAR(60)  NOT NULL,
    password_digest         VARCHAR(255) NOT NULL,
    nickname                VARCHAR(50)  NOT NULL DEFAULT '',
    email                   VARCHAR(100) NOT NULL DEFAULT '',
    registered_at           DATETIME(6)  NOT NULL,
    refresh_token           VARCHAR(255) NULL,
    refresh_token_issued_at DATETIME(6)  NULL,
    access_token            VARCHAR(255) NULL,
    access_token_issued_at  DATETIME(6)  NULL,
    previous_access_token   VARCHAR(255) NULL,
    PRIMARY KEY (id),
    UNIQUE KEY uk_user_name (user_name),
    UNIQUE KEY uk_access_token (access_token),
    UNIQUE KEY uk_refresh_token (refresh_token),
    KEY idx_email (email)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
"#,
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        info!(table = self.table.as_str(), "account table ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_account(row: MySqlRow) -> Result<Account, StoreError> {
        let id: u64 = row.try_get("id").map_err(store_error)?;
        Ok(Account {
            id: AccountId(id),
            user_name: row.try_get("user_name").map_err(store_error)?,
            nickname: row.try_get("nickname").map_err(store_error)?,
            email: row.try_get("email").map_err(store_error)?,
            password_digest: row.try_get("password_digest").map_err(store_error)?,
            registered_at: row.try_get("registered_at").map_err(store_error)?,
            access_token: row.try_get("access_token").map_err(store_error)?,
            access_token_issued_at: row.try_get("access_token_issued_at").map_err(store_error)?,
            previous_access_token: row.try_get("previous_access_token").map_err(store_error)?,
            refresh_token: row.try_get("refresh_token").map_err(store_error)?,
            refresh_token_issued_at: row
                .try_get("refresh_token_issued_at")
                .map_err(store_error)?,
        })
    }

    /// Run an UPDATE guarded by `access_token <=> ?`. Guarded writes always
    /// change the row, so zero affected rows means the guard failed.
    async fn execute_guarded(
        &self,
        query: sqlx::query::Query<'_, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    ) -> Result<(), StoreError> {
        let result = query.execute(&self.pool).await.map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    /// Run a single-row UPDATE; zero affected rows means the account is gone.
    async fn execute_update(
        &self,
        query: sqlx::query::Query<'_, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    ) -> Result<(), StoreError> {
        let result = query.execute(&self.pool).await.map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for MySqlAccountStore {
    async fn find_by_user_name(&self, user_name: &str) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
SELECT id, user_name, password_digest, nickname, email, registered_at,
       refresh_token, refresh_token_issued_at,
       access_token, access_token_issued_at, previous_access_token
FROM `{}`
WHERE user_name = ?
"#,
            self.table
        );
        let row_opt: Option<MySqlRow> = sqlx::query(&sql)
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row_opt
            .map(Self::row_to_account)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        let sql = format!(
            r#"
INSERT INTO `{}` (user_name, password_digest, nickname, email, registered_at)
VALUES (?, ?, ?, ?, ?)
"#,
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(&account.user_name)
            .bind(&account.password_digest)
            .bind(&account.nickname)
            .bind(&account.email)
            .bind(account.registered_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(AccountId(result.last_insert_id()))
    }

    async fn update_refresh_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE `{}` SET refresh_token = ?, refresh_token_issued_at = ? WHERE user_name = ?",
            self.table
        );
        self.execute_update(sqlx::query(&sql).bind(token).bind(issued_at).bind(user_name))
            .await
    }

    async fn update_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE `{}` SET access_token = ?, access_token_issued_at = ? WHERE user_name = ?",
            self.table
        );
        self.execute_update(sqlx::query(&sql).bind(token).bind(issued_at).bind(user_name))
            .await
    }

    async fn update_previous_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        // MySQL reports zero affected rows when the value is unchanged, so
        // existence is not inferred from the row count here.
        let sql = format!(
            "UPDATE `{}` SET previous_access_token = ? WHERE user_name = ?",
            self.table
        );
        sqlx::query(&sql)
            .bind(token)
            .bind(user_name)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn issue_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        refresh_token: &str,
        access_token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
UPDATE `{}`
SET refresh_token = ?, refresh_token_issued_at = ?,
    access_token = ?, access_token_issued_at = ?,
    previous_access_token = NULL
WHERE user_name = ? AND access_token <=> ?
"#,
            self.table
        );
        self.execute_guarded(
            sqlx::query(&sql)
                .bind(refresh_token)
                .bind(issued_at)
                .bind(access_token)
                .bind(issued_at)
                .bind(user_name)
                .bind(expected_access),
        )
        .await
    }

    async fn rotate_access_token(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        previous: Option<&str>,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
UPDATE `{}`
SET previous_access_token = ?, access_token = ?, access_token_issued_at = ?
WHERE user_name = ? AND access_token <=> ?
"#,
            self.table
        );
        self.execute_guarded(
            sqlx::query(&sql)
                .bind(previous)
                .bind(token)
                .bind(issued_at)
                .bind(user_name)
                .bind(expected_access),
        )
        .await
    }

    async fn clear_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
UPDATE `{}`
SET access_token = NULL, access_token_issued_at = ?,
    previous_access_token = NULL, refresh_token = NULL
WHERE user_name = ? AND access_token <=> ?
"#,
            self.table
        );
        self.execute_guarded(
            sqlx::query(&sql)
                .bind(revoked_at)
                .bind(user_name)
                .bind(expected_access),
        )
        .await
    }
}

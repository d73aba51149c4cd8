use crate::prelude::*;
use crate::Result;
use chrono::prelude::*;
use sea_query::{Expr, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use teloxide::types::{ChatId, MessageId, UserId};

/// A message kept in the storage chat, that can be requested by anyone
/// who knows its slug via a `t.me/<bot>?start=<slug>` deep link.
#[derive(Debug, sqlx::FromRow)]
#[sea_query::enum_def]
pub(crate) struct TgStoredFile {
    pub(crate) slug: String,
    pub(crate) storage_chat_id: i64,
    pub(crate) storage_message_id: i32,
    pub(crate) uploaded_by: i64,
    pub(crate) original_chat_id: i64,
    pub(crate) original_message_id: i32,
    pub(crate) created_at: DateTime<Utc>,
}

impl TgStoredFile {
    pub(crate) fn storage_chat(&self) -> ChatId {
        ChatId(self.storage_chat_id)
    }

    pub(crate) fn storage_message(&self) -> MessageId {
        MessageId(self.storage_message_id)
    }
}

pub(crate) struct NewStoredFile<'a> {
    pub(crate) slug: &'a str,
    pub(crate) storage_chat: ChatId,
    pub(crate) storage_message: MessageId,
    pub(crate) uploaded_by: UserId,
    pub(crate) original_chat: ChatId,
    pub(crate) original_message: MessageId,
}

#[derive(Clone)]
pub(crate) struct StoredFileRepo {
    db: sqlx::PgPool,
}

impl StoredFileRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    #[instrument(skip_all, fields(slug = file.slug))]
    pub(crate) async fn insert(&self, file: NewStoredFile<'_>) -> Result {
        let uploaded_by = i64::try_from(file.uploaded_by.0)
            .fatal_ctx(|| format!("User id doesn't fit into i64: {}", file.uploaded_by))?;

        let (sql, values) = Query::insert()
            .into_table(TgStoredFileIden::Table)
            .columns([
                TgStoredFileIden::Slug,
                TgStoredFileIden::StorageChatId,
                TgStoredFileIden::StorageMessageId,
                TgStoredFileIden::UploadedBy,
                TgStoredFileIden::OriginalChatId,
                TgStoredFileIden::OriginalMessageId,
            ])
            .values_panic([
                file.slug.into(),
                file.storage_chat.0.into(),
                file.storage_message.0.into(),
                uploaded_by.into(),
                file.original_chat.0.into(),
                file.original_message.0.into(),
            ])
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.db).await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub(crate) async fn get_by_slug(&self, slug: &str) -> Result<Option<TgStoredFile>> {
        let (sql, values) = Query::select()
            .columns([
                TgStoredFileIden::Slug,
                TgStoredFileIden::StorageChatId,
                TgStoredFileIden::StorageMessageId,
                TgStoredFileIden::UploadedBy,
                TgStoredFileIden::OriginalChatId,
                TgStoredFileIden::OriginalMessageId,
                TgStoredFileIden::CreatedAt,
            ])
            .from(TgStoredFileIden::Table)
            .and_where(Expr::col(TgStoredFileIden::Slug).eq(slug))
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_as_with(&sql, values)
            .fetch_optional(&self.db)
            .await
            .map_err(Into::into)
    }
}

use crate::broadcast::{Subscriber, SubscriberKey, SubscriberStore};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use sea_query::{Asterisk, Expr, Func, Iden, OnConflict, Order, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use teloxide::types::{ChatId, User};

#[derive(Iden)]
enum TgSubscriberIden {
    #[iden = "tg_subscriber"]
    Table,
    ChatId,
    Seq,
    Username,
    FirstName,
    LastName,
    UpdatedAt,
}

/// Who to register as a subscriber. The profile columns are refreshed
/// every time the same chat registers again.
pub(crate) struct NewSubscriber<'a> {
    pub(crate) chat_id: ChatId,
    pub(crate) user: Option<&'a User>,
}

#[derive(Clone)]
pub(crate) struct SubscriberRepo {
    db: sqlx::PgPool,
}

impl SubscriberRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Returns `true` if the subscriber didn't exist before
    #[instrument(skip_all, fields(chat_id = %subscriber.chat_id))]
    pub(crate) async fn upsert(&self, subscriber: NewSubscriber<'_>) -> Result<bool> {
        let user = subscriber.user;

        let on_conflict = OnConflict::column(TgSubscriberIden::ChatId)
            .update_columns([
                TgSubscriberIden::Username,
                TgSubscriberIden::FirstName,
                TgSubscriberIden::LastName,
            ])
            .value(TgSubscriberIden::UpdatedAt, Expr::current_timestamp())
            .to_owned();

        // `xmax` is zero only for the rows inserted by this very statement
        let (sql, values) = Query::insert()
            .into_table(TgSubscriberIden::Table)
            .columns([
                TgSubscriberIden::ChatId,
                TgSubscriberIden::Username,
                TgSubscriberIden::FirstName,
                TgSubscriberIden::LastName,
            ])
            .values_panic([
                subscriber.chat_id.0.into(),
                user.and_then(|user| user.username.clone()).into(),
                user.map(|user| user.first_name.clone()).into(),
                user.and_then(|user| user.last_name.clone()).into(),
            ])
            .on_conflict(on_conflict)
            .returning(Query::returning().expr(Expr::cust("xmax = 0")))
            .build_sqlx(PostgresQueryBuilder);

        let inserted: bool = sqlx::query_scalar_with(&sql, values)
            .fetch_one(&self.db)
            .await?;

        debug!(inserted, "Registered subscriber");

        Ok(inserted)
    }
}

#[async_trait]
impl SubscriberStore for SubscriberRepo {
    async fn page(&self, after: Option<SubscriberKey>, limit: u32) -> Result<Vec<Subscriber>> {
        let mut query = Query::select();

        query
            .columns([TgSubscriberIden::Seq, TgSubscriberIden::ChatId])
            .from(TgSubscriberIden::Table)
            .order_by(TgSubscriberIden::Seq, Order::Asc)
            .limit(limit.into());

        if let Some(SubscriberKey(after)) = after {
            query.and_where(Expr::col(TgSubscriberIden::Seq).gt(after));
        }

        let (sql, values) = query.build_sqlx(PostgresQueryBuilder);

        let rows: Vec<(i64, i64)> = sqlx::query_as_with(&sql, values)
            .fetch_all(&self.db)
            .await?;

        let page = rows
            .into_iter()
            .map(|(seq, chat_id)| Subscriber {
                key: SubscriberKey(seq),
                chat_id: ChatId(chat_id),
            })
            .collect();

        Ok(page)
    }

    async fn remove(&self, chat_id: ChatId) -> Result<bool> {
        let (sql, values) = Query::delete()
            .from_table(TgSubscriberIden::Table)
            .and_where(Expr::col(TgSubscriberIden::ChatId).eq(chat_id.0))
            .build_sqlx(PostgresQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64> {
        let (sql, values) = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(TgSubscriberIden::Table)
            .build_sqlx(PostgresQueryBuilder);

        let count: i64 = sqlx::query_scalar_with(&sql, values)
            .fetch_one(&self.db)
            .await?;

        u64::try_from(count).fatal_ctx(|| format!("Negative subscriber count: {count}"))
    }
}

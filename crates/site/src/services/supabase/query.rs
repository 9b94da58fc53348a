//! PostgREST request builder.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{SupabaseClient, SupabaseError};

/// A request against one table, built up with filters before it is sent.
///
/// ```rust,ignore
/// let posts: Vec<Post> = supabase
///     .table("posts")
///     .select("id,title,slug")
///     .eq("status", "published")
///     .order("published_at", false)
///     .limit(20)
///     .fetch()
///     .await?;
/// ```
#[derive(Debug)]
#[must_use]
pub struct Query<'a> {
    client: &'a SupabaseClient,
    table: String,
    params: Vec<(String, String)>,
    token: Option<String>,
}

impl<'a> Query<'a> {
    pub(super) fn new(client: &'a SupabaseClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            params: Vec::new(),
            token: None,
        }
    }

    /// Columns to return (PostgREST `select`).
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "eq", value)
    }

    /// `column >= value`
    pub fn gte(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "gte", value)
    }

    /// Case-insensitive `LIKE`; use `*` as the wildcard.
    pub fn ilike(self, column: &str, pattern: impl std::fmt::Display) -> Self {
        self.filter(column, "ilike", pattern)
    }

    /// `column IN (values...)`
    pub fn in_list<I, S>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({joined})"))
    }

    /// Raw PostgREST `or=(...)` expression, e.g. `title.ilike.*x*,slug.eq.x`.
    pub fn or(mut self, expression: &str) -> Self {
        self.params
            .push(("or".to_string(), format!("({expression})")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params
            .push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.params.push(("offset".to_string(), offset.to_string()));
        self
    }

    /// Send the request as a signed-in user so row-level security applies.
    pub fn as_user(mut self, access_token: &str) -> Self {
        self.token = Some(access_token.to_string());
        self
    }

    fn filter(mut self, column: &str, operator: &str, value: impl std::fmt::Display) -> Self {
        self.params
            .push((column.to_string(), format!("{operator}.{value}")));
        self
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.client.url(), self.table);
        let token = self
            .token
            .as_deref()
            .unwrap_or_else(|| self.client.server_token());
        self.client
            .http()
            .request(method, url)
            .bearer_auth(token)
            .query(&self.params)
    }

    /// Fetch matching rows.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a non-2xx status, or a body that
    /// does not deserialize into `T`.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, SupabaseError> {
        let response = self.request(Method::GET).send().await?;
        read_json(response).await
    }

    /// Fetch the first matching row, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Query::fetch`].
    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, SupabaseError> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows and return what was stored.
    ///
    /// # Errors
    ///
    /// Same as [`Query::fetch`].
    pub async fn insert<B, T>(self, body: &B) -> Result<Vec<T>, SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Insert without reading the stored rows back.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx status.
    pub async fn insert_minimal<B>(self, body: &B) -> Result<(), SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        expect_success(response).await
    }

    /// Insert rows, merging into existing rows that collide on `on_conflict`.
    ///
    /// Re-running with the same rows converges to the same table state.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx status.
    pub async fn upsert<B>(mut self, rows: &B, on_conflict: &str) -> Result<(), SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.params
            .push(("on_conflict".to_string(), on_conflict.to_string()));
        let response = self
            .request(Method::POST)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        expect_success(response).await
    }

    /// Patch every matching row and return the updated rows.
    ///
    /// # Errors
    ///
    /// Same as [`Query::fetch`].
    pub async fn update<B, T>(self, patch: &B) -> Result<Vec<T>, SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::PATCH)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        read_json(response).await
    }

    /// Delete every matching row.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx status.
    pub async fn delete(self) -> Result<(), SupabaseError> {
        let response = self.request(Method::DELETE).send().await?;
        expect_success(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SupabaseError> {
    if !response.status().is_success() {
        return Err(SupabaseClient::parse_error(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| SupabaseError::Parse(format!("Failed to parse response: {e}")))
}

async fn expect_success(response: reqwest::Response) -> Result<(), SupabaseError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(SupabaseClient::parse_error(response).await)
    }
}

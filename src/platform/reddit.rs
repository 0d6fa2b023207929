//! Reddit implementation of the platform interface
//!
//! Authenticates as a script application with the password grant and talks to
//! the OAuth API host. Every call is a single attempt; failures are returned to
//! the caller untouched.

use crate::config::ConfigError;
use crate::platform::{
    Comment, FlagUpdate, Platform, PlatformError, PlatformResult, Submission, Thing,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
/// Most comment ids `/api/morechildren` accepts per call
const MORE_CHILDREN_BATCH: usize = 100;
/// Upper bound on expansion requests for a single submission
const MAX_EXPANSION_REQUESTS: usize = 200;
/// Subject line of removal notices
const NOTICE_TITLE: &str = "Your submission was removed";
/// Author name Reddit reports for deleted accounts
const DELETED_AUTHOR: &str = "[deleted]";

/// Script-application credentials
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl RedditCredentials {
    /// Read credentials from the process environment
    ///
    /// # Errors
    /// Returns `ConfigError::MissingVar` when a required variable is unset
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup
    ///
    /// # Errors
    /// Returns `ConfigError::MissingVar` when a required variable is absent or empty
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        let username = required("REDDIT_USERNAME")?;
        let user_agent = lookup("REDDIT_USER_AGENT")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "{}/{} (by u/{username})",
                    crate::BOT_NAME,
                    env!("CARGO_PKG_VERSION")
                )
            });

        Ok(Self {
            client_id: required("REDDIT_CLIENT_ID")?,
            client_secret: required("REDDIT_CLIENT_SECRET")?,
            password: required("REDDIT_PASSWORD")?,
            username,
            user_agent,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Fields of a link submission the bot relies on
#[derive(Debug, Clone, Deserialize)]
pub struct RedditSubmissionData {
    pub id: String,
    pub title: String,
    pub created_utc: f64,
    pub author: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub distinguished: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
    #[serde(default)]
    pub removed_by_category: Option<String>,
}

/// Fields of a comment the bot relies on
#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub distinguished: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub removed: Option<bool>,
}

/// Placeholder for comments that were not included in a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreStub {
    /// Fullname of the comment or submission the hidden comments hang off
    pub parent_id: String,
    /// Ids of the hidden comments; empty for "continue this thread" links
    pub children: Vec<String>,
    /// Depth the hidden comments sit at
    pub depth: u32,
}

#[derive(Debug, Deserialize)]
struct RedditMoreData {
    parent_id: String,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    depth: u32,
}

fn present_author(author: Option<String>) -> Option<String> {
    author.filter(|name| !name.is_empty() && name != DELETED_AUTHOR)
}

impl From<RedditSubmissionData> for Submission {
    fn from(data: RedditSubmissionData) -> Self {
        let created_utc = DateTime::<Utc>::from_timestamp_millis((data.created_utc * 1000.0) as i64)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self {
            id: data.id,
            title: data.title,
            created_utc,
            author: present_author(data.author),
            is_self: data.is_self,
            approved: data.approved.unwrap_or(false),
            locked: data.locked,
            distinguished: data.distinguished.is_some(),
            removed: data.removed.unwrap_or(false) || data.removed_by_category.is_some(),
        }
    }
}

impl From<RedditCommentData> for Comment {
    fn from(data: RedditCommentData) -> Self {
        Self {
            id: data.id,
            author: present_author(data.author),
            body: data.body,
            depth: data.depth.unwrap_or(0),
            is_submitter: data.is_submitter,
            stickied: data.stickied,
            distinguished: data.distinguished.is_some(),
            locked: data.locked,
            removed: data.removed.unwrap_or(false),
        }
    }
}

/// Parse a submission listing such as the one returned by `/r/{name}/new`
///
/// # Errors
/// Returns `PlatformError::InvalidResponse` if the value is not a listing of submissions
pub fn parse_submission_listing(value: Value) -> PlatformResult<Vec<Submission>> {
    let listing: RedditListing<RedditSubmissionData> = serde_json::from_value(value)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .map(|child| child.data.into())
        .collect())
}

/// Flatten a list of comment/more things, descending into `replies`
///
/// Comments are appended to `comments` in depth-first tree order, each shifted
/// by `depth_offset`; "more" placeholders are appended to `stubs`.
///
/// # Errors
/// Returns `PlatformError::InvalidResponse` if a child does not have the expected shape
pub fn flatten_comment_things(
    things: &[Value],
    depth_offset: u32,
    comments: &mut Vec<Comment>,
    stubs: &mut Vec<MoreStub>,
) -> PlatformResult<()> {
    for thing in things {
        let kind = thing.get("kind").and_then(Value::as_str).unwrap_or_default();
        let data = thing
            .get("data")
            .ok_or_else(|| PlatformError::InvalidResponse("thing without data".to_string()))?;

        match kind {
            "t1" => {
                let parsed: RedditCommentData = serde_json::from_value(data.clone())?;
                let mut comment = Comment::from(parsed);
                comment.depth += depth_offset;
                comments.push(comment);

                // `replies` is an empty string when there are none
                if let Some(children) = data
                    .pointer("/replies/data/children")
                    .and_then(Value::as_array)
                {
                    flatten_comment_things(children, depth_offset, comments, stubs)?;
                }
            }
            "more" => {
                let more: RedditMoreData = serde_json::from_value(data.clone())?;
                stubs.push(MoreStub {
                    parent_id: more.parent_id,
                    children: more.children,
                    depth: more.depth + depth_offset,
                });
            }
            other => debug!("Ignoring unexpected thing kind '{other}' in comment tree"),
        }
    }
    Ok(())
}

/// Fail if an `api_type=json` response carries errors
fn check_api_errors(value: &Value) -> PlatformResult<()> {
    match value.pointer("/json/errors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(PlatformError::Api(
            Value::Array(errors.clone()).to_string(),
        )),
        _ => Ok(()),
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

/// Authenticated Reddit API client
#[derive(Debug)]
pub struct RedditClient {
    http_client: Client,
    access_token: String,
    username: String,
}

impl RedditClient {
    /// Authenticate and create a client
    ///
    /// # Errors
    /// Returns `PlatformError::Authentication` when Reddit rejects the credentials
    pub async fn connect(credentials: RedditCredentials) -> PlatformResult<Self> {
        let http_client = Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        let response = http_client
            .post(REDDIT_AUTH_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Authentication(format!(
                "token request failed with status {}",
                response.status()
            )));
        }

        let token: AccessTokenResponse = response.json().await?;
        let access_token = match (token.access_token, token.error) {
            (Some(access_token), None) => access_token,
            (_, Some(error)) => return Err(PlatformError::Authentication(error)),
            (None, None) => {
                return Err(PlatformError::Authentication(
                    "no access token in response".to_string(),
                ));
            }
        };

        info!("Authenticated with Reddit as u/{}", credentials.username);

        Ok(Self {
            http_client,
            access_token,
            username: credentials.username,
        })
    }

    /// Name of the account the client acts as
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> PlatformResult<Response> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!("Request successful: {status} {endpoint}");
            return Ok(response);
        }

        warn!("Request failed with status {status} for {endpoint}");
        Err(match status {
            StatusCode::UNAUTHORIZED => {
                PlatformError::Authentication(format!("{endpoint} rejected the access token"))
            }
            StatusCode::NOT_FOUND => PlatformError::NotFound(endpoint.to_string()),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60);
                PlatformError::RateLimited { retry_after }
            }
            _ => PlatformError::Status {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            },
        })
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> PlatformResult<Value> {
        let url = format!("{REDDIT_API_BASE}{endpoint}");
        let request = self
            .http_client
            .get(url)
            .query(&[("raw_json", "1")])
            .query(query);
        let response = self.send(request, endpoint).await?;
        Ok(response.json().await?)
    }

    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> PlatformResult<Value> {
        let url = format!("{REDDIT_API_BASE}{endpoint}");
        let request = self
            .http_client
            .post(url)
            .query(&[("raw_json", "1")])
            .form(form);
        let response = self.send(request, endpoint).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&body)?;
        check_api_errors(&value)?;
        Ok(value)
    }

    /// Resolve a batch of hidden comment ids through `/api/morechildren`
    async fn more_children(
        &self,
        link_fullname: &str,
        children: &[String],
        comments: &mut Vec<Comment>,
        stubs: &mut Vec<MoreStub>,
    ) -> PlatformResult<()> {
        let children = children.join(",");
        let value = self
            .get_json(
                "/api/morechildren",
                &[
                    ("api_type", "json"),
                    ("link_id", link_fullname),
                    ("children", children.as_str()),
                    ("limit_children", "false"),
                ],
            )
            .await?;
        check_api_errors(&value)?;

        let things = value
            .pointer("/json/data/things")
            .and_then(Value::as_array)
            .ok_or_else(|| PlatformError::InvalidResponse("morechildren without things".to_string()))?;

        // Results come back flat with absolute depths, so no recursion is needed
        flatten_comment_things(things, 0, comments, stubs)
    }

    /// Load a "continue this thread" branch below `parent_fullname`
    async fn continue_thread(
        &self,
        submission_id: &str,
        parent_fullname: &str,
        depth: u32,
        comments: &mut Vec<Comment>,
        stubs: &mut Vec<MoreStub>,
    ) -> PlatformResult<()> {
        let parent_id = parent_fullname.trim_start_matches("t1_");
        let endpoint = format!("/comments/{submission_id}");
        let value = self
            .get_json(&endpoint, &[("comment", parent_id), ("limit", "500")])
            .await?;

        let parent = value
            .pointer("/1/data/children/0")
            .ok_or_else(|| PlatformError::InvalidResponse("empty thread continuation".to_string()))?;

        // The focused parent comes back at depth 0 with its replies at 1
        if let Some(replies) = parent
            .pointer("/data/replies/data/children")
            .and_then(Value::as_array)
        {
            flatten_comment_things(replies, depth.saturating_sub(1), comments, stubs)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Platform for RedditClient {
    async fn list_recent(&self, collection: &str, limit: usize) -> PlatformResult<Vec<Submission>> {
        let endpoint = format!("/r/{collection}/new");
        let limit = limit.to_string();
        let value = self.get_json(&endpoint, &[("limit", limit.as_str())]).await?;
        let submissions = parse_submission_listing(value)?;

        info!("Retrieved {} submissions from r/{collection}", submissions.len());
        Ok(submissions)
    }

    async fn expand_comments(&self, submission: &Submission) -> PlatformResult<Vec<Comment>> {
        let endpoint = format!("/comments/{}", submission.id);
        let value = self
            .get_json(&endpoint, &[("limit", "500"), ("showmore", "true")])
            .await?;

        let things = value
            .pointer("/1/data/children")
            .and_then(Value::as_array)
            .ok_or_else(|| PlatformError::InvalidResponse(format!("no comment listing for {endpoint}")))?;

        let mut comments = Vec::new();
        let mut stubs = Vec::new();
        flatten_comment_things(things, 0, &mut comments, &mut stubs)?;

        let link_fullname = submission.thing().fullname();
        let mut pending: VecDeque<MoreStub> = stubs.into();
        let mut requests = 0;

        while let Some(stub) = pending.pop_front() {
            if requests >= MAX_EXPANSION_REQUESTS {
                warn!(
                    "Stopped expanding comments of {} after {requests} requests",
                    submission.id
                );
                break;
            }

            let mut found = Vec::new();
            if stub.children.is_empty() {
                requests += 1;
                self.continue_thread(
                    &submission.id,
                    &stub.parent_id,
                    stub.depth,
                    &mut comments,
                    &mut found,
                )
                .await?;
            } else {
                for batch in stub.children.chunks(MORE_CHILDREN_BATCH) {
                    requests += 1;
                    self.more_children(&link_fullname, batch, &mut comments, &mut found)
                        .await?;
                }
            }
            pending.extend(found);
        }

        // Continuations can repeat comments that were already loaded
        let mut seen = HashSet::new();
        comments.retain(|comment| seen.insert(comment.id.clone()));

        debug!(
            "Expanded {} comments for {} with {requests} extra requests",
            comments.len(),
            submission.id
        );
        Ok(comments)
    }

    async fn remove(&self, target: &Thing, note: &str) -> PlatformResult<()> {
        let fullname = target.fullname();
        self.post_form("/api/remove", &[("id", fullname.as_str()), ("spam", "false")])
            .await?;

        if !note.is_empty() {
            let payload = json!({
                "item_ids": [fullname],
                "mod_note": note,
                "reason_id": Value::Null,
            })
            .to_string();
            self.post_form(
                "/api/v1/modactions/removal_reasons",
                &[("json", payload.as_str())],
            )
            .await?;
        }
        Ok(())
    }

    async fn approve(&self, target: &Thing) -> PlatformResult<()> {
        let fullname = target.fullname();
        self.post_form("/api/approve", &[("id", fullname.as_str())])
            .await?;
        Ok(())
    }

    async fn reply(&self, submission: &Submission, text: &str) -> PlatformResult<Comment> {
        let fullname = submission.thing().fullname();
        let value = self
            .post_form(
                "/api/comment",
                &[
                    ("api_type", "json"),
                    ("thing_id", fullname.as_str()),
                    ("text", text),
                ],
            )
            .await?;

        let data = value
            .pointer("/json/data/things/0/data")
            .cloned()
            .ok_or_else(|| PlatformError::InvalidResponse("reply without comment data".to_string()))?;
        let comment: RedditCommentData = serde_json::from_value(data)?;
        Ok(comment.into())
    }

    async fn send_notice(&self, submission: &Submission, text: &str) -> PlatformResult<()> {
        let payload = json!({
            "item_id": [submission.thing().fullname()],
            "message": text,
            "title": NOTICE_TITLE,
            "type": "private",
        })
        .to_string();
        self.post_form(
            "/api/v1/modactions/removal_link_message",
            &[("json", payload.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn set_flags(&self, comment: &Comment, flags: FlagUpdate) -> PlatformResult<()> {
        let fullname = comment.thing().fullname();
        let id = fullname.as_str();

        if let Some(sticky) = flags.sticky {
            let how = if sticky { "yes" } else { "no" };
            self.post_form(
                "/api/distinguish",
                &[
                    ("api_type", "json"),
                    ("id", id),
                    ("how", how),
                    ("sticky", bool_param(sticky)),
                ],
            )
            .await?;
        }
        if let Some(locked) = flags.locked {
            let endpoint = if locked { "/api/lock" } else { "/api/unlock" };
            self.post_form(endpoint, &[("id", id)]).await?;
        }
        if let Some(ignore) = flags.ignore_reports {
            let endpoint = if ignore {
                "/api/ignore_reports"
            } else {
                "/api/unignore_reports"
            };
            self.post_form(endpoint, &[("id", id)]).await?;
        }
        Ok(())
    }
}

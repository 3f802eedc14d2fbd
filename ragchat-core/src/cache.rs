//! Per-session cache of paginated message history
//!
//! The cache holds the most recently fetched pages of each session, oldest
//! message first. The first page fetched is the most recent one; `load_more`
//! walks back through older pages via the backend cursor.
//!
//! Entries are keyed by opaque session id and invalidated one session at a
//! time. After a turn completes the owning session is refreshed so that
//! server-assigned ids and token counts replace optimistic client state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::{Message, MessagePage, PageRequest};

/// Where history pages come from
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch one page of a session's messages.
    async fn fetch_page(&self, session_id: &str, page: &PageRequest) -> Result<MessagePage>;
}

/// Cached history of one session
#[derive(Debug, Clone)]
pub struct SessionHistory {
    /// Loaded messages in chronological order
    pub messages: Vec<Message>,
    /// Cursor for the next older page
    pub next_cursor: Option<String>,
    /// Whether older pages exist
    pub has_more: bool,
    /// When the most recent page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl SessionHistory {
    fn from_page(page: MessagePage) -> Self {
        Self {
            messages: page.messages,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
            fetched_at: Utc::now(),
        }
    }

    /// Prepend an older page.
    fn extend_older(&mut self, page: MessagePage) {
        let mut messages = page.messages;
        // Pages can overlap if messages arrived between fetches.
        messages.retain(|m| !self.messages.iter().any(|known| known.id == m.id));
        messages.append(&mut self.messages);
        self.messages = messages;
        self.next_cursor = page.next_cursor;
        self.has_more = page.has_more;
    }

    /// Cursor to follow, if an older page exists.
    fn older_cursor(&self) -> Option<&str> {
        if self.has_more {
            self.next_cursor.as_deref()
        } else {
            None
        }
    }
}

/// Client-side cache of message history keyed by session id
#[derive(Debug)]
pub struct MessageCache {
    page_size: u32,
    sessions: HashMap<String, SessionHistory>,
}

impl MessageCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            sessions: HashMap::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Cached history without fetching.
    pub fn get(&self, session_id: &str) -> Option<&SessionHistory> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cached history, fetching the most recent page on a miss.
    pub async fn load<S>(&mut self, source: &S, session_id: &str) -> Result<&SessionHistory>
    where
        S: MessageSource + ?Sized,
    {
        let history = match self.sessions.remove(session_id) {
            Some(history) => history,
            None => {
                let page = source
                    .fetch_page(session_id, &PageRequest::latest(self.page_size))
                    .await?;
                tracing::debug!(
                    session_id,
                    messages = page.messages.len(),
                    has_more = page.has_more,
                    "Fetched latest history page"
                );
                SessionHistory::from_page(page)
            }
        };
        let history = self
            .sessions
            .entry(session_id.to_string())
            .or_insert(history);
        Ok(&*history)
    }

    /// Load the next older page, or the latest page if nothing is cached.
    ///
    /// Returns the history unchanged when no older page exists.
    pub async fn load_more<S>(&mut self, source: &S, session_id: &str) -> Result<&SessionHistory>
    where
        S: MessageSource + ?Sized,
    {
        let cursor = match self.sessions.get(session_id) {
            None => return self.load(source, session_id).await,
            Some(history) => match history.older_cursor() {
                Some(cursor) => cursor.to_string(),
                None => return self.load(source, session_id).await,
            },
        };

        let page = source
            .fetch_page(session_id, &PageRequest::before(self.page_size, cursor))
            .await?;
        tracing::debug!(
            session_id,
            messages = page.messages.len(),
            has_more = page.has_more,
            "Fetched older history page"
        );

        let history = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        history.extend_older(page);
        Ok(&*history)
    }

    /// Load every page of a session.
    pub async fn load_all<S>(&mut self, source: &S, session_id: &str) -> Result<&SessionHistory>
    where
        S: MessageSource + ?Sized,
    {
        self.load(source, session_id).await?;
        while self
            .sessions
            .get(session_id)
            .and_then(|h| h.older_cursor())
            .is_some()
        {
            self.load_more(source, session_id).await?;
        }
        self.sessions
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Drop one session's cached history. Other sessions are untouched.
    pub fn invalidate(&mut self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id, "Invalidated cached history");
        }
        removed
    }

    /// Invalidate and refetch the most recent page.
    pub async fn refresh<S>(&mut self, source: &S, session_id: &str) -> Result<&SessionHistory>
    where
        S: MessageSource + ?Sized,
    {
        self.invalidate(session_id);
        self.load(source, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves a fixed history, newest page first.
    struct FakeSource {
        messages: Mutex<Vec<Message>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<(String, PageRequest)>>,
    }

    impl FakeSource {
        fn with_messages(count: usize) -> Self {
            let messages = (0..count)
                .map(|i| Message {
                    id: format!("m{}", i),
                    session_id: "s1".to_string(),
                    role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                    content: format!("message {}", i),
                    created_at: None,
                    metadata: serde_json::Value::Null,
                })
                .collect();
            Self {
                messages: Mutex::new(messages),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn fetch_page(&self, session_id: &str, page: &PageRequest) -> Result<MessagePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .unwrap()
                .push((session_id.to_string(), page.clone()));

            let messages = self.messages.lock().unwrap();
            // The cursor is the index one past the newest message of the page.
            let end = match &page.cursor {
                Some(cursor) => cursor.parse::<usize>().unwrap(),
                None => messages.len(),
            };
            let start = end.saturating_sub(page.limit as usize);
            Ok(MessagePage {
                messages: messages[start..end].to_vec(),
                next_cursor: (start > 0).then(|| start.to_string()),
                has_more: start > 0,
            })
        }
    }

    fn ids(history: &SessionHistory) -> Vec<&str> {
        history.messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_load_fetches_latest_page_once() {
        let source = FakeSource::with_messages(5);
        let mut cache = MessageCache::new(2);

        let history = cache.load(&source, "s1").await.unwrap();
        assert_eq!(ids(history), vec!["m3", "m4"]);
        assert!(history.has_more);

        cache.load(&source, "s1").await.unwrap();
        assert_eq!(source.calls(), 1);
        assert!(cache.contains("s1"));
    }

    #[tokio::test]
    async fn test_load_more_walks_back_in_time() {
        let source = FakeSource::with_messages(5);
        let mut cache = MessageCache::new(2);

        cache.load(&source, "s1").await.unwrap();
        let history = cache.load_more(&source, "s1").await.unwrap();
        assert_eq!(ids(history), vec!["m1", "m2", "m3", "m4"]);

        let history = cache.load_more(&source, "s1").await.unwrap();
        assert_eq!(ids(history), vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(!history.has_more);

        // Nothing older: served from cache.
        cache.load_more(&source, "s1").await.unwrap();
        assert_eq!(source.calls(), 3);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[1].1, PageRequest::before(2, "3"));
    }

    #[tokio::test]
    async fn test_load_more_without_cache_loads_latest() {
        let source = FakeSource::with_messages(3);
        let mut cache = MessageCache::new(2);

        let history = cache.load_more(&source, "s1").await.unwrap();
        assert_eq!(ids(history), vec!["m1", "m2"]);
        assert_eq!(source.requests.lock().unwrap()[0].1, PageRequest::latest(2));
    }

    #[tokio::test]
    async fn test_load_all() {
        let source = FakeSource::with_messages(7);
        let mut cache = MessageCache::new(3);

        let history = cache.load_all(&source, "s1").await.unwrap();
        assert_eq!(history.messages.len(), 7);
        assert_eq!(history.messages[0].id, "m0");
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_supersedes_cached_state() {
        let source = FakeSource::with_messages(2);
        let mut cache = MessageCache::new(10);
        cache.load(&source, "s1").await.unwrap();

        source.messages.lock().unwrap().push(Message {
            id: "m2".to_string(),
            session_id: "s1".to_string(),
            role: Role::Assistant,
            content: "persisted answer".to_string(),
            created_at: None,
            metadata: serde_json::json!({"token_count": 12}),
        });

        assert_eq!(cache.get("s1").unwrap().messages.len(), 2);
        let history = cache.refresh(&source, "s1").await.unwrap();
        assert_eq!(history.messages.len(), 3);
        assert_eq!(history.messages[2].token_count(), Some(12));
    }

    #[tokio::test]
    async fn test_invalidation_is_per_session() {
        let source = FakeSource::with_messages(2);
        let mut cache = MessageCache::new(10);
        cache.load(&source, "s1").await.unwrap();
        cache.load(&source, "s2").await.unwrap();

        assert!(cache.invalidate("s1"));
        assert!(!cache.invalidate("s1"));
        assert!(!cache.contains("s1"));
        assert!(cache.contains("s2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overlapping_pages_are_deduplicated() {
        let mut history = SessionHistory::from_page(MessagePage {
            messages: vec![Message {
                id: "m2".to_string(),
                session_id: "s1".to_string(),
                role: Role::User,
                content: String::new(),
                created_at: None,
                metadata: serde_json::Value::Null,
            }],
            next_cursor: Some("c".to_string()),
            has_more: true,
        });
        let older = MessagePage {
            messages: history.messages.clone(),
            next_cursor: None,
            has_more: false,
        };
        history.extend_older(older);
        assert_eq!(history.messages.len(), 1);
        assert!(history.older_cursor().is_none());
    }
}

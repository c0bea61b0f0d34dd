//! Thread lookup table built before the message pass.
//!
//! Listing threads once up front means "did this message start a thread?" is
//! a map lookup instead of a remote call per message.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::model::{Snowflake, Thread};
use crate::source::ChannelSource;

/// File name of the top-level channel document.
pub const INDEX_DOCUMENT: &str = "index.html";

/// File name of a thread's document. Depends only on the ID so parent
/// documents can link to it across runs.
pub fn thread_document_name(thread_id: Snowflake) -> String {
    format!("thread_{}_index.html", thread_id)
}

#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    threads: HashMap<Snowflake, Thread>,
}

impl ThreadIndex {
    /// Union of the channel's archived and active threads.
    ///
    /// A failed listing is logged and skipped so one permission gap does not
    /// sink the whole export.
    pub async fn discover(source: &dyn ChannelSource, channel_id: Snowflake) -> Result<Self> {
        let mut index = Self::default();

        match source.list_archived_threads(channel_id).await {
            Ok(threads) => index.extend(threads),
            Err(err) => warn!("Archived threads unavailable for {}: {:#}", channel_id, err),
        }
        // Active listing is fresher, so it overwrites archived entries.
        match source.list_active_threads(channel_id).await {
            Ok(threads) => index.extend(threads),
            Err(err) => warn!("Active threads unavailable for {}: {:#}", channel_id, err),
        }

        info!("Channel {}: {} threads discovered", channel_id, index.len());
        Ok(index)
    }

    pub fn from_threads(threads: impl IntoIterator<Item = Thread>) -> Self {
        let mut index = Self::default();
        index.extend(threads);
        index
    }

    fn extend(&mut self, threads: impl IntoIterator<Item = Thread>) {
        for thread in threads {
            self.threads.insert(thread.id, thread);
        }
    }

    pub fn get(&self, id: Snowflake) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub fn contains(&self, id: Snowflake) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Threads in ascending ID (creation) order.
    pub fn sorted(&self) -> Vec<&Thread> {
        let mut threads: Vec<&Thread> = self.threads.values().collect();
        threads.sort_by_key(|t| t.id);
        threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use crate::source::Directory;
    use async_trait::async_trait;

    struct ThreadSource {
        archived: Vec<Thread>,
        active: Vec<Thread>,
        fail_archived: bool,
    }

    #[async_trait]
    impl ChannelSource for ThreadSource {
        async fn list_messages(&self, _channel_id: Snowflake) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn list_active_threads(&self, _channel_id: Snowflake) -> Result<Vec<Thread>> {
            Ok(self.active.clone())
        }

        async fn list_archived_threads(&self, _channel_id: Snowflake) -> Result<Vec<Thread>> {
            if self.fail_archived {
                anyhow::bail!("403 Missing Access");
            }
            Ok(self.archived.clone())
        }

        async fn fetch_message(
            &self,
            _channel_id: Snowflake,
            _message_id: Snowflake,
        ) -> Result<Option<Message>> {
            Ok(None)
        }

        async fn load_directory(&self, _channel_id: Snowflake) -> Result<Directory> {
            Ok(Directory::new())
        }
    }

    fn thread(id: Snowflake, name: &str, count: u32) -> Thread {
        Thread {
            id,
            name: name.to_string(),
            message_count: count,
            parent_channel_id: 1,
        }
    }

    #[test]
    fn test_thread_document_name_is_stable() {
        assert_eq!(thread_document_name(42), "thread_42_index.html");
        assert_eq!(thread_document_name(42), thread_document_name(42));
    }

    #[tokio::test]
    async fn test_discover_unions_archived_and_active() {
        let source = ThreadSource {
            archived: vec![thread(30, "old", 4), thread(10, "stale name", 1)],
            active: vec![thread(10, "live", 2), thread(20, "new", 0)],
            fail_archived: false,
        };
        let index = ThreadIndex::discover(&source, 1).await.unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(10).unwrap().name, "live");
        assert!(index.contains(30));
        let ids: Vec<_> = index.sorted().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_discover_survives_listing_failure() {
        let source = ThreadSource {
            archived: Vec::new(),
            active: vec![thread(5, "only", 3)],
            fail_archived: true,
        };
        let index = ThreadIndex::discover(&source, 1).await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains(5));
    }
}

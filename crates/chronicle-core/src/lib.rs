//! Chronicle: archive a chat channel's history into browsable HTML documents
//! and size-bounded zip shards.
//!
//! The platform is reached through [`ChannelSource`] and [`ArchiveDelivery`];
//! everything here is platform-neutral.

pub mod assets;
pub mod compose;
pub mod config;
pub mod exporter;
pub mod markdown;
pub mod model;
pub mod packager;
pub mod queue;
pub mod render;
pub mod source;
pub mod threads;

pub use assets::{AssetCache, CachedAsset};
pub use compose::{should_coalesce, MessageComposer};
pub use config::{ChronicleConfig, DiscordConfig, ExportConfig, DEFAULT_CONFIG_FILE};
pub use exporter::{ChannelExporter, DocumentTemplate, ExportReport};
pub use markdown::{tokenize, tokenize_with, Mode, Token, TokenKind};
pub use model::{
    Attachment, Author, Embed, EmbedAuthor, EmbedField, EmbedMedia, ExportJob, Message,
    MessageKind, Reaction, ReactionEmoji, Snowflake, Thread,
};
pub use packager::{ArchiveError, ArchivePackager, ArchiveShard};
pub use queue::{ExportQueue, ExportWorker, JobRunner, QueueOrder};
pub use render::Renderer;
pub use source::{ArchiveDelivery, ChannelSource, Directory, EmojiRef, EntityResolver};
pub use threads::{thread_document_name, ThreadIndex};

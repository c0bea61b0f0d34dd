//! Discord implementation of chronicle's [`ChannelSource`] and
//! [`ArchiveDelivery`] seams, over the bot REST API.
//!
//! [`ChannelSource`]: chronicle_core::ChannelSource
//! [`ArchiveDelivery`]: chronicle_core::ArchiveDelivery

mod client;
mod wire;

pub use client::{call_with_backoff, DiscordClient, NotFound};

//! Message catalog: type ids, payload shapes, encodings and channels.
//!
//! The catalog is assembled once with [`CatalogBuilder`] and then shared
//! read-only (`Arc<MessageCatalog>`) by every session.

mod bits;
mod messages;

use std::fmt;

pub use bits::{BitReader, BitWriter};
pub use messages::{
    INTERACT_MESSAGE, InteractMessage, InteractMessageCodec, TEST_MESSAGE, TestMessage,
    TestMessageCodec, payload_bits,
};

use crate::error::{NetError, Result};
use crate::net::ChannelKind;

pub type MessageType = u16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Test(TestMessage),
    Interact(InteractMessage),
}

impl Message {
    pub fn type_id(&self) -> MessageType {
        match self {
            Message::Test(_) => TEST_MESSAGE,
            Message::Interact(_) => INTERACT_MESSAGE,
        }
    }
}

/// Encode/decode pair for one message type.
pub trait MessageCodec: Send + Sync + fmt::Debug {
    /// Zeroed instance of the payload.
    fn create(&self) -> Message;
    fn encode(&self, message: &Message, writer: &mut BitWriter) -> Result<()>;
    fn decode(&self, reader: &mut BitReader<'_>) -> Result<Message>;
}

#[derive(Debug)]
struct CatalogEntry {
    channel: ChannelKind,
    codec: Box<dyn MessageCodec>,
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: Vec<Option<CatalogEntry>>,
}

impl CatalogBuilder {
    pub fn register(
        mut self,
        type_id: MessageType,
        channel: ChannelKind,
        codec: impl MessageCodec + 'static,
    ) -> Result<Self> {
        if !self.insert(type_id, channel, Box::new(codec)) {
            return Err(NetError::DuplicateMessageType(type_id));
        }
        Ok(self)
    }

    fn insert(
        &mut self,
        type_id: MessageType,
        channel: ChannelKind,
        codec: Box<dyn MessageCodec>,
    ) -> bool {
        let index = type_id as usize;
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, || None);
        }
        if self.entries[index].is_some() {
            return false;
        }
        self.entries[index] = Some(CatalogEntry { channel, codec });
        true
    }

    pub fn build(self) -> MessageCatalog {
        MessageCatalog {
            entries: self.entries,
        }
    }
}

#[derive(Debug)]
pub struct MessageCatalog {
    entries: Vec<Option<CatalogEntry>>,
}

impl MessageCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Test message on the reliable-ordered channel, interact message on the
    /// unreliable one.
    pub fn standard() -> Self {
        let mut builder = Self::builder();
        builder.insert(
            TEST_MESSAGE,
            ChannelKind::ReliableOrdered,
            Box::new(TestMessageCodec),
        );
        builder.insert(
            INTERACT_MESSAGE,
            ChannelKind::UnreliableUnordered,
            Box::new(InteractMessageCodec),
        );
        builder.build()
    }

    fn entry(&self, type_id: MessageType) -> Result<&CatalogEntry> {
        self.entries
            .get(type_id as usize)
            .and_then(Option::as_ref)
            .ok_or(NetError::UnknownMessageType(type_id))
    }

    pub fn is_registered(&self, type_id: MessageType) -> bool {
        self.entry(type_id).is_ok()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(id, _)| id as MessageType)
    }

    pub fn channel_for(&self, type_id: MessageType) -> Result<ChannelKind> {
        Ok(self.entry(type_id)?.channel)
    }

    pub fn create(&self, type_id: MessageType) -> Result<Message> {
        Ok(self.entry(type_id)?.codec.create())
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let entry = self.entry(message.type_id())?;
        let mut writer = BitWriter::new();
        entry.codec.encode(message, &mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn decode(&self, data: &[u8], type_id: MessageType) -> Result<Message> {
        let entry = self.entry(type_id)?;
        let mut reader = BitReader::new(data);
        let message = entry.codec.decode(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_zeroed() {
        let catalog = MessageCatalog::standard();
        assert_eq!(
            catalog.create(TEST_MESSAGE).unwrap(),
            Message::Test(TestMessage::new(0, 0))
        );
        assert_eq!(
            catalog.create(INTERACT_MESSAGE).unwrap(),
            Message::Interact(InteractMessage { entity_id: 0 })
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let catalog = MessageCatalog::standard();
        assert!(matches!(
            catalog.create(7),
            Err(NetError::UnknownMessageType(7))
        ));
        assert!(matches!(
            catalog.decode(&[0, 0], 500),
            Err(NetError::UnknownMessageType(500))
        ));
        assert!(!catalog.is_registered(2));
    }

    #[test]
    fn empty_catalog_rejects_everything() {
        let catalog = MessageCatalog::builder().build();
        let msg = Message::Test(TestMessage::new(1, 2));
        assert!(matches!(
            catalog.encode(&msg),
            Err(NetError::UnknownMessageType(TEST_MESSAGE))
        ));
        assert_eq!(catalog.type_ids().count(), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = MessageCatalog::builder()
            .register(TEST_MESSAGE, ChannelKind::ReliableOrdered, TestMessageCodec)
            .unwrap()
            .register(TEST_MESSAGE, ChannelKind::UnreliableUnordered, TestMessageCodec);
        assert!(matches!(result, Err(NetError::DuplicateMessageType(0))));
    }

    #[test]
    fn messages_survive_encoding() {
        let catalog = MessageCatalog::standard();
        let samples = [
            Message::Test(TestMessage::new(0, 100)),
            Message::Test(TestMessage::new(16, 7)),
            Message::Test(TestMessage::new(u16::MAX, u32::MAX)),
            Message::Interact(InteractMessage { entity_id: 42 }),
        ];

        for msg in samples {
            let bytes = catalog.encode(&msg).unwrap();
            let decoded = catalog.decode(&bytes, msg.type_id()).unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(catalog.encode(&decoded).unwrap(), bytes);
        }
    }

    #[test]
    fn decode_rejects_trailing_data() {
        let catalog = MessageCatalog::standard();
        let mut bytes = catalog
            .encode(&Message::Interact(InteractMessage { entity_id: 1 }))
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            catalog.decode(&bytes, INTERACT_MESSAGE),
            Err(NetError::MalformedMessage(_))
        ));
    }

    #[test]
    fn channels_follow_registration() {
        let catalog = MessageCatalog::standard();
        assert_eq!(
            catalog.channel_for(TEST_MESSAGE).unwrap(),
            ChannelKind::ReliableOrdered
        );
        assert_eq!(
            catalog.channel_for(INTERACT_MESSAGE).unwrap(),
            ChannelKind::UnreliableUnordered
        );
    }
}

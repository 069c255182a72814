//! Playlist item storage
//!
//! Items form a doubly-linked list, but the links are ids into a keyed
//! store rather than pointers: the playlist exclusively owns every item,
//! and `prev`/`next` are non-owning back-references. All mutation happens
//! under the playlist's coordinator lock.

use crate::media::File;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque handle to one playlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One playable entry: a file bound to a gain
pub(crate) struct ItemNode {
    pub file: Arc<File>,
    pub gain: f64,
    pub prev: Option<ItemId>,
    pub next: Option<ItemId>,
}

/// The doubly-linked item list
#[derive(Default)]
pub(crate) struct ItemList {
    nodes: HashMap<ItemId, ItemNode>,
    head: Option<ItemId>,
    tail: Option<ItemId>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<ItemId> {
        self.head
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut ItemNode> {
        self.nodes.get_mut(&id)
    }

    pub fn next(&self, id: ItemId) -> Option<ItemId> {
        self.nodes.get(&id).and_then(|n| n.next)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Splice a new item in before `before`, or append when `before` is
    /// `None`. Returns the new item's id.
    pub fn insert_before(
        &mut self,
        file: Arc<File>,
        gain: f64,
        before: Option<ItemId>,
    ) -> ItemId {
        let id = ItemId::new();
        let (prev, next) = match before {
            Some(next_id) if self.nodes.contains_key(&next_id) => {
                (self.nodes[&next_id].prev, Some(next_id))
            }
            _ => (self.tail, None),
        };

        self.nodes.insert(id, ItemNode { file, gain, prev, next });

        match prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(&n) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }

        self.debug_assert_well_formed();
        id
    }

    /// Remove an item from the list, returning its node.
    pub fn unlink(&mut self, id: ItemId) -> Option<ItemNode> {
        let node = self.nodes.remove(&id)?;
        match node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(&p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(&n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        self.debug_assert_well_formed();
        Some(node)
    }

    fn debug_assert_well_formed(&self) {
        #[cfg(debug_assertions)]
        {
            let mut seen = 0usize;
            let mut prev: Option<ItemId> = None;
            let mut cursor = self.head;
            while let Some(id) = cursor {
                let node = self.nodes.get(&id).expect("link to missing node");
                assert_eq!(node.prev, prev, "broken back-link at {}", id);
                prev = Some(id);
                cursor = node.next;
                seen += 1;
                assert!(seen <= self.nodes.len(), "cycle in item list");
            }
            assert_eq!(prev, self.tail, "tail does not terminate the list");
            assert_eq!(seen, self.nodes.len(), "unreachable nodes in item list");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ChannelLayout, Rational, SampleFormat};
    use crate::error::Result;
    use crate::media::{Frame, MediaSource, Packet, StreamInfo};

    struct NullSource;

    impl MediaSource for NullSource {
        fn stream_info(&self) -> StreamInfo {
            StreamInfo {
                stream_index: 0,
                sample_rate: 44100,
                channel_layout: ChannelLayout::STEREO,
                sample_format: SampleFormat::F32,
                time_base: Rational::new(1, 44100),
                start_time: None,
            }
        }

        fn read_packet(&mut self) -> Result<Option<Packet>> {
            Ok(None)
        }

        fn seek(&mut self, _ts: i64) -> Result<()> {
            Ok(())
        }
    }

    struct NullDecoder;

    impl crate::media::FrameDecoder for NullDecoder {
        fn decode(&mut self, _packet: &Packet) -> Result<Vec<Frame>> {
            Ok(Vec::new())
        }

        fn flush(&mut self) {}
    }

    fn file() -> Arc<File> {
        Arc::new(File::new(Box::new(NullSource), Box::new(NullDecoder)))
    }

    fn collect(list: &ItemList) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut cursor = list.head();
        while let Some(id) = cursor {
            out.push(id);
            cursor = list.next(id);
        }
        out
    }

    #[test]
    fn test_append_builds_ordered_list() {
        let mut list = ItemList::new();
        let a = list.insert_before(file(), 1.0, None);
        let b = list.insert_before(file(), 1.0, None);
        let c = list.insert_before(file(), 1.0, None);
        assert_eq!(collect(&list), vec![a, b, c]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_insert_before_head_links_both_directions() {
        let mut list = ItemList::new();
        let b = list.insert_before(file(), 1.0, None);
        let a = list.insert_before(file(), 1.0, Some(b));
        assert_eq!(collect(&list), vec![a, b]);
        assert_eq!(list.get(b).unwrap().prev, Some(a));
        assert_eq!(list.get(a).unwrap().prev, None);
    }

    #[test]
    fn test_insert_middle() {
        let mut list = ItemList::new();
        let a = list.insert_before(file(), 1.0, None);
        let c = list.insert_before(file(), 1.0, None);
        let b = list.insert_before(file(), 1.0, Some(c));
        assert_eq!(collect(&list), vec![a, b, c]);
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let mut list = ItemList::new();
        let a = list.insert_before(file(), 1.0, None);
        let b = list.insert_before(file(), 1.0, None);
        let c = list.insert_before(file(), 1.0, None);

        list.unlink(b).unwrap();
        assert_eq!(collect(&list), vec![a, c]);

        list.unlink(a).unwrap();
        assert_eq!(collect(&list), vec![c]);

        list.unlink(c).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
    }

    #[test]
    fn test_unlink_missing_returns_none() {
        let mut list = ItemList::new();
        let a = list.insert_before(file(), 1.0, None);
        list.unlink(a).unwrap();
        assert!(list.unlink(a).is_none());
    }
}

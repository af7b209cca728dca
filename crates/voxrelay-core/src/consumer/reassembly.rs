//! Gap-tolerant reordering of fragments for one conversation

use std::collections::BTreeMap;
use tracing::debug;

use crate::protocol::{ConversationId, FragmentMessage};

#[derive(Debug, Clone)]
struct Pending {
    sentence: String,
    last: bool,
}

/// Sentences made releasable by one arrival, in index order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Release {
    pub sentences: Vec<String>,
    /// The terminal fragment was among the released ones
    pub complete: bool,
}

/// Holding pool that releases fragments strictly by index
#[derive(Debug)]
pub struct ReassemblyBuffer {
    conversation_id: ConversationId,
    expected_index: u64,
    pending: BTreeMap<u64, Pending>,
    complete: bool,
}

impl ReassemblyBuffer {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            expected_index: 0,
            pending: BTreeMap::new(),
            complete: false,
        }
    }

    /// Accept one fragment and release every sentence that became contiguous.
    ///
    /// Duplicates, already-released indices and anything arriving after the
    /// terminal fragment are ignored.
    pub fn accept(&mut self, fragment: FragmentMessage) -> Release {
        let mut release = Release::default();
        if self.complete || fragment.index < self.expected_index {
            debug!(
                "Ignoring stale fragment {}#{}",
                self.conversation_id, fragment.index
            );
            return release;
        }

        self.pending.entry(fragment.index).or_insert(Pending {
            sentence: fragment.sentence,
            last: fragment.last,
        });

        while let Some(next) = self.pending.remove(&self.expected_index) {
            self.expected_index += 1;
            release.sentences.push(next.sentence);
            if next.last {
                self.complete = true;
                self.pending.clear();
                break;
            }
        }

        release.complete = self.complete;
        if !self.pending.is_empty() {
            debug!(
                "Conversation {} waiting on index {} ({} held)",
                self.conversation_id,
                self.expected_index,
                self.pending.len()
            );
        }
        release
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn expected_index(&self) -> u64 {
        self.expected_index
    }

    pub fn held(&self) -> usize {
        self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(index: u64, sentence: &str, last: bool) -> FragmentMessage {
        FragmentMessage {
            sentence: sentence.to_string(),
            conversation_id: "c".into(),
            index,
            last,
        }
    }

    #[test]
    fn test_in_order_release() {
        let mut buffer = ReassemblyBuffer::new("c".into());
        assert_eq!(buffer.accept(fragment(0, "a", false)).sentences, vec!["a"]);
        let release = buffer.accept(fragment(1, "b", true));
        assert_eq!(release.sentences, vec!["b"]);
        assert!(release.complete);
    }

    #[test]
    fn test_out_of_order_release_completes_last() {
        let mut buffer = ReassemblyBuffer::new("c".into());

        let release = buffer.accept(fragment(2, "two", true));
        assert!(release.sentences.is_empty());
        assert!(!release.complete);
        assert_eq!(buffer.held(), 1);

        let release = buffer.accept(fragment(0, "zero", false));
        assert_eq!(release.sentences, vec!["zero"]);
        assert!(!release.complete);
        assert!(!buffer.is_complete());

        let release = buffer.accept(fragment(1, "one", false));
        assert_eq!(release.sentences, vec!["one", "two"]);
        assert!(release.complete);
        assert_eq!(buffer.expected_index(), 3);
    }

    #[test]
    fn test_gap_holds_later_fragments() {
        let mut buffer = ReassemblyBuffer::new("c".into());
        buffer.accept(fragment(0, "a", false));
        assert!(buffer.accept(fragment(2, "c", false)).sentences.is_empty());
        assert!(buffer.accept(fragment(3, "d", false)).sentences.is_empty());
        assert_eq!(buffer.expected_index(), 1);
        assert_eq!(buffer.held(), 2);
    }

    #[test]
    fn test_duplicates_are_noops() {
        let mut buffer = ReassemblyBuffer::new("c".into());
        buffer.accept(fragment(1, "first copy", false));
        buffer.accept(fragment(1, "second copy", false));
        let release = buffer.accept(fragment(0, "zero", false));
        assert_eq!(release.sentences, vec!["zero", "first copy"]);

        assert!(buffer.accept(fragment(0, "zero again", false)).sentences.is_empty());
    }

    #[test]
    fn test_nothing_after_completion() {
        let mut buffer = ReassemblyBuffer::new("c".into());
        assert!(buffer.accept(fragment(0, "", true)).complete);
        let release = buffer.accept(fragment(1, "late", false));
        assert!(release.sentences.is_empty());
    }
}

//! Sentence segmentation of streamed model output.
//!
//! [`Segmenter`] is the synchronous state machine: it accumulates text deltas
//! and cuts a fragment at the first terminator of a chunk once the candidate
//! is long enough. [`SegmentationEngine`] drives it from an async delta stream,
//! honouring cancellation at every suspension point and pushing indexed
//! fragments onto the fragment channel.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::registry::{ConversationRegistry, LiveConversation};
use crate::config::SegmenterConfig;
use crate::error::Result;
use crate::protocol::{ConversationId, FragmentMessage};

/// A fragment cut by the segmenter, before it is addressed to a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: u64,
    pub sentence: String,
    pub last: bool,
}

/// Accumulating sentence splitter for a single answer
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    buffer: String,
    buffer_chars: usize,
    next_index: u64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            buffer_chars: 0,
            next_index: 0,
        }
    }

    /// Feed one delta. Returns a segment when the chunk closes a long enough
    /// candidate.
    ///
    /// Only the first terminator in `chunk` is considered; anything after it
    /// stays in the buffer and is scanned again only as part of later input.
    pub fn push(&mut self, chunk: &str) -> Option<Segment> {
        let Some((pos, terminator)) = self.find_terminator(chunk) else {
            self.append(chunk);
            return None;
        };

        let split = pos + terminator.len_utf8();
        let (head, rest) = chunk.split_at(split);
        let candidate_chars = self.buffer_chars + head.chars().count();
        if candidate_chars < self.config.min_fragment_chars {
            self.append(chunk);
            return None;
        }

        let mut sentence = std::mem::take(&mut self.buffer);
        sentence.push_str(head);
        self.buffer_chars = 0;
        self.append(rest);

        Some(self.next_segment(sentence, false))
    }

    /// Flush whatever is buffered as the final segment, even if empty
    pub fn finish(mut self) -> Segment {
        let sentence = std::mem::take(&mut self.buffer);
        self.next_segment(sentence, true)
    }

    /// Number of segments cut so far
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn find_terminator(&self, chunk: &str) -> Option<(usize, char)> {
        chunk
            .char_indices()
            .find(|(_, c)| self.config.terminators.contains(c))
    }

    fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.buffer_chars += text.chars().count();
    }

    fn next_segment(&mut self, sentence: String, last: bool) -> Segment {
        let index = self.next_index;
        self.next_index += 1;
        Segment {
            index,
            sentence,
            last,
        }
    }
}

/// How a segmentation run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationOutcome {
    /// The stream ended (possibly with a failure) and the final fragment was sent
    Completed {
        fragments: u64,
        answer: String,
        failure: Option<String>,
    },
    /// Cancellation was observed; nothing further was emitted
    Cancelled { fragments: u64 },
    /// The fragment channel closed under us
    Disconnected { fragments: u64 },
}

impl SegmentationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SegmentationOutcome::Completed { .. })
    }
}

enum Emit {
    Sent,
    Cancelled,
    Disconnected,
}

/// Drives a [`Segmenter`] over a model delta stream for one conversation
#[derive(Clone)]
pub struct SegmentationEngine {
    config: SegmenterConfig,
    registry: Arc<ConversationRegistry>,
}

impl SegmentationEngine {
    pub fn new(config: SegmenterConfig, registry: Arc<ConversationRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    /// Segment `deltas` into fragments for `conversation_id`, sending each on `out`.
    ///
    /// A failing stream ends the run like a normal completion: the buffered
    /// remainder is still flushed as the last fragment and the failure is
    /// reported in the outcome.
    pub async fn run<S>(
        &self,
        conversation_id: ConversationId,
        live: LiveConversation,
        deltas: S,
        out: &mpsc::Sender<FragmentMessage>,
    ) -> SegmentationOutcome
    where
        S: Stream<Item = Result<String>>,
    {
        tokio::pin!(deltas);
        let handle = live.handle.clone();
        let mut segmenter = Segmenter::new(self.config.clone());
        let mut answer = String::new();
        let mut failure = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = handle.cancelled() => {
                    return self.stop(&conversation_id, &live, &segmenter, Emit::Cancelled);
                }
                next = deltas.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    answer.push_str(&chunk);
                    if let Some(segment) = segmenter.push(&chunk) {
                        match self.emit(&conversation_id, &live, segment, out).await {
                            Emit::Sent => {}
                            other => {
                                return self.stop(&conversation_id, &live, &segmenter, other);
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("Model stream for {} failed: {}", conversation_id, e);
                    let message = e.to_string();
                    answer.push_str(&message);
                    failure = Some(message);
                    break;
                }
                None => break,
            }
        }

        if handle.is_cancelled() {
            return self.stop(&conversation_id, &live, &segmenter, Emit::Cancelled);
        }

        self.registry.finish(&conversation_id, &live);

        let fragments = segmenter.emitted() + 1;
        let last = segmenter.finish();
        match self.emit(&conversation_id, &live, last, out).await {
            Emit::Sent => {
                info!(
                    "Conversation {} segmented into {} fragments",
                    conversation_id, fragments
                );
                SegmentationOutcome::Completed {
                    fragments,
                    answer,
                    failure,
                }
            }
            Emit::Cancelled => SegmentationOutcome::Cancelled {
                fragments: fragments - 1,
            },
            Emit::Disconnected => SegmentationOutcome::Disconnected {
                fragments: fragments - 1,
            },
        }
    }

    async fn emit(
        &self,
        conversation_id: &ConversationId,
        live: &LiveConversation,
        segment: Segment,
        out: &mpsc::Sender<FragmentMessage>,
    ) -> Emit {
        if live.handle.is_cancelled() {
            return Emit::Cancelled;
        }

        debug!(
            "Fragment {}#{} ({} chars, last={})",
            conversation_id,
            segment.index,
            segment.sentence.chars().count(),
            segment.last
        );
        let message = FragmentMessage {
            sentence: segment.sentence,
            conversation_id: conversation_id.clone(),
            index: segment.index,
            last: segment.last,
        };

        tokio::select! {
            biased;
            _ = live.handle.cancelled() => Emit::Cancelled,
            sent = out.send(message) => match sent {
                Ok(()) => Emit::Sent,
                Err(_) => Emit::Disconnected,
            },
        }
    }

    fn stop(
        &self,
        conversation_id: &ConversationId,
        live: &LiveConversation,
        segmenter: &Segmenter,
        reason: Emit,
    ) -> SegmentationOutcome {
        self.registry.finish(conversation_id, live);
        let fragments = segmenter.emitted();
        match reason {
            Emit::Disconnected => {
                warn!(
                    "Fragment channel closed for {} after {} fragments",
                    conversation_id, fragments
                );
                SegmentationOutcome::Disconnected { fragments }
            }
            _ => {
                info!(
                    "Conversation {} cancelled after {} fragments",
                    conversation_id, fragments
                );
                SegmentationOutcome::Cancelled { fragments }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::stream;

    fn segment_all(chunks: &[&str]) -> Vec<Segment> {
        let mut segmenter = Segmenter::new(SegmenterConfig::default());
        let mut out: Vec<Segment> = chunks.iter().filter_map(|c| segmenter.push(c)).collect();
        out.push(segmenter.finish());
        out
    }

    fn engine() -> SegmentationEngine {
        SegmentationEngine::new(
            SegmenterConfig::default(),
            Arc::new(ConversationRegistry::new()),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<FragmentMessage>) -> Vec<FragmentMessage> {
        let mut out = Vec::new();
        while let Ok(fragment) = rx.try_recv() {
            out.push(fragment);
        }
        out
    }

    #[test]
    fn test_short_candidate_keeps_accumulating() {
        let segments = segment_all(&["你好", "，世界。今天"]);
        assert_eq!(
            segments,
            vec![Segment {
                index: 0,
                sentence: "你好，世界。今天".to_string(),
                last: true,
            }]
        );
    }

    #[test]
    fn test_cut_after_first_terminator_only() {
        let segments = segment_all(&[
            "The weather today is lovely",
            ", and tomorrow. Rain",
            " is expected later tonight! ok",
        ]);
        let sentences: Vec<&str> = segments.iter().map(|s| s.sentence.as_str()).collect();
        assert_eq!(
            sentences,
            vec![
                "The weather today is lovely,",
                " and tomorrow. Rain is expected later tonight!",
                " ok",
            ]
        );
        assert!(segments[2].last);
    }

    #[test]
    fn test_threshold_counts_characters_not_bytes() {
        // 11 CJK characters plus the terminator reach the threshold exactly.
        let segments = segment_all(&["一二三四五六七八九十壹", "。尾巴"]);
        assert_eq!(segments[0].sentence, "一二三四五六七八九十壹。");
        assert!(!segments[0].last);
        assert_eq!(segments[1].sentence, "尾巴");
    }

    #[test]
    fn test_indices_contiguous_and_text_preserved() {
        let chunks = [
            "Once upon a time, ",
            "there was a small",
            " fox. It lived in a wood; ",
            "every day",
            " it ran? Yes!",
            "",
            "The end.",
        ];
        let segments = segment_all(&chunks);

        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i as u64);
            assert_eq!(segment.last, i == segments.len() - 1);
        }
        let rebuilt: String = segments.iter().map(|s| s.sentence.as_str()).collect();
        assert_eq!(rebuilt, chunks.concat());
        for segment in &segments[..segments.len() - 1] {
            let tail = segment.sentence.chars().last().unwrap();
            assert!(SegmenterConfig::default().terminators.contains(&tail));
        }
    }

    fn assert_well_formed(segments: &[Segment], text: &str, chunks: &[&str]) {
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i as u64, "chunks {:?}", chunks);
            assert_eq!(segment.last, i == segments.len() - 1, "chunks {:?}", chunks);
        }
        let rebuilt: String = segments.iter().map(|s| s.sentence.as_str()).collect();
        assert_eq!(rebuilt, text, "chunks {:?}", chunks);
    }

    #[test]
    fn test_every_chunking_preserves_order_and_text() {
        let text = "Hi, this is a longer reply. 你好，今天天气很好吗？是的！ok; done: yes.";
        let cuts: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        for &a in &cuts {
            for &b in cuts.iter().filter(|&&b| b >= a) {
                let chunks = [&text[..a], &text[a..b], &text[b..]];
                assert_well_formed(&segment_all(&chunks), text, &chunks);
            }
        }

        // One character per chunk.
        let singles: Vec<String> = text.chars().map(String::from).collect();
        let chunks: Vec<&str> = singles.iter().map(String::as_str).collect();
        let segments = segment_all(&chunks);
        assert!(segments.len() > 1);
        assert_well_formed(&segments, text, &chunks);
    }

    #[test]
    fn test_empty_stream_flushes_empty_last() {
        let segments = segment_all(&[]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sentence, "");
        assert!(segments[0].last);
    }

    #[tokio::test]
    async fn test_engine_emits_indexed_fragments() {
        let engine = engine();
        let id = ConversationId::from("conv");
        let live = engine.registry().register(id.clone());
        let (tx, mut rx) = mpsc::channel(16);

        let deltas = stream::iter(vec![
            Ok("Hello there my friend,".to_string()),
            Ok(" how are you doing today?".to_string()),
            Ok(" Bye".to_string()),
        ]);
        let outcome = engine.run(id.clone(), live, deltas, &tx).await;

        let fragments = drain(&mut rx);
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.conversation_id == id));
        assert_eq!(
            fragments.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(fragments[2].last && !fragments[1].last);
        assert!(matches!(
            outcome,
            SegmentationOutcome::Completed { fragments: 3, ref answer, failure: None }
                if answer == "Hello there my friend, how are you doing today? Bye"
        ));
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_engine_flushes_after_stream_failure() {
        let engine = engine();
        let id = ConversationId::from("conv");
        let live = engine.registry().register(id.clone());
        let (tx, mut rx) = mpsc::channel(16);

        let deltas = stream::iter(vec![
            Ok("A sentence that is long enough. Then".to_string()),
            Ok(" some more".to_string()),
            Err(Error::Model("upstream reset".to_string())),
            Ok("never read".to_string()),
        ]);
        let outcome = engine.run(id, live, deltas, &tx).await;

        let fragments = drain(&mut rx);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].sentence, " Then some more");
        assert!(fragments[1].last);
        match outcome {
            SegmentationOutcome::Completed { failure, answer, .. } => {
                assert!(failure.unwrap().contains("upstream reset"));
                assert!(!answer.contains("never read"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_engine_stops_on_cancellation() {
        let engine = engine();
        let registry = engine.registry().clone();
        let id = ConversationId::from("conv");
        let live = registry.register(id.clone());
        let (tx, mut rx) = mpsc::channel(16);
        let (delta_tx, delta_rx) = mpsc::channel::<Result<String>>(4);

        let run = tokio::spawn({
            let engine = engine.clone();
            let id = id.clone();
            async move {
                let deltas = futures::stream::unfold(delta_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                engine.run(id, live, deltas, &tx).await
            }
        });

        delta_tx
            .send(Ok("The first sentence is here. Then".to_string()))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.index, 0);

        assert!(registry.cancel(&id));
        let outcome = run.await.unwrap();
        assert_eq!(outcome, SegmentationOutcome::Cancelled { fragments: 1 });

        // The stream was never closed, yet nothing else arrives.
        assert!(rx.recv().await.is_none());
        assert!(registry.lookup(&id).is_none());
    }

    #[tokio::test]
    async fn test_engine_reports_disconnect() {
        let engine = engine();
        let id = ConversationId::from("conv");
        let live = engine.registry().register(id.clone());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let deltas = stream::iter(vec![Ok("Long enough to be a sentence.".to_string())]);
        let outcome = engine.run(id, live, deltas, &tx).await;
        assert_eq!(outcome, SegmentationOutcome::Disconnected { fragments: 1 });
        assert!(engine.registry().is_empty());
    }
}

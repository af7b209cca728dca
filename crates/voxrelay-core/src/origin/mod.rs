//! Origin side: conversation tracking and answer segmentation

mod registry;
mod segmenter;

pub use registry::{CancellationHandle, ConversationRegistry, LiveConversation};
pub use segmenter::{Segment, SegmentationEngine, SegmentationOutcome, Segmenter};
